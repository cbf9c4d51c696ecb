//! Single-path simulator: one randomized daily-balance trajectory.
//!
//! RULES:
//!   - A trial is pure: inputs + its own RNG stream, no shared state.
//!   - runway_days ∈ [1, horizon]; it equals the horizon when the
//!     balance never reached zero (censored), which `hit_zero`
//!     distinguishes from true exhaustion.
//!   - Zero is latched: only the FIRST day at or below zero sets the
//!     runway, even if the balance later recovers and dips again.

use crate::{
    baseline::{BaselineProfile, DayImpact},
    config::SimConfig,
    rng::TrialRng,
};

/// Outcome of one simulated path. Ephemeral: consumed by the
/// statistics aggregator, never persisted.
#[derive(Debug, Clone)]
pub struct PathResult {
    pub daily_balances: Vec<f64>,
    pub final_balance: f64,
    pub runway_days: u32,
    pub hit_zero: bool,
    pub min_balance: f64,
    pub max_balance: f64,
}

pub struct PathSimulator<'a> {
    config: &'a SimConfig,
}

impl<'a> PathSimulator<'a> {
    pub fn new(config: &'a SimConfig) -> Self {
        Self { config }
    }

    /// Simulate one path over `horizon_days`. `impacts` must already be
    /// resolved to day offsets; multiple impacts may share a day.
    pub fn simulate(
        &self,
        baseline: &BaselineProfile,
        horizon_days: u32,
        impacts: &[DayImpact],
        rng: &mut TrialRng,
    ) -> PathResult {
        let mut balance = baseline.current_balance;
        let mut daily_balances = Vec::with_capacity(horizon_days as usize);
        let mut min_balance = balance;
        let mut max_balance = balance;
        let mut runway_days = horizon_days.max(1);
        let mut hit_zero = false;

        for day in 1..=horizon_days {
            let mut income = rng
                .normal(baseline.daily_income_mean, baseline.daily_income_std_dev)
                .max(0.0);
            let mut expense = rng
                .normal(baseline.daily_expense_mean, baseline.daily_expense_std_dev)
                .max(0.0);

            // Independent shock term, rare and uniformly sized.
            if rng.chance(self.config.shock_probability) {
                expense += rng.uniform(self.config.shock_min, self.config.shock_max);
            }

            for impact in impacts.iter().filter(|i| i.day == day) {
                if impact.amount >= 0.0 {
                    income += impact.amount;
                } else {
                    expense += -impact.amount;
                }
            }

            balance += income - expense;
            daily_balances.push(balance);
            min_balance = min_balance.min(balance);
            max_balance = max_balance.max(balance);

            if !hit_zero && balance <= 0.0 {
                hit_zero = true;
                runway_days = day;
            }
        }

        PathResult {
            final_balance: balance,
            daily_balances,
            runway_days,
            hit_zero,
            min_balance,
            max_balance,
        }
    }
}

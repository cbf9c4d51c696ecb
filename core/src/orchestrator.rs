//! Simulation orchestrator: baseline gathering, scenario application,
//! Monte Carlo fan-out, and statistics aggregation.
//!
//! RULES:
//!   - Baseline-data errors propagate. An inaccurate baseline corrupts
//!     every downstream statistic, so it is never silently defaulted.
//!   - Trials run on the rayon pool; each trial owns its RNG stream
//!     derived from (master seed, trial index), so thread scheduling
//!     never changes the aggregate output.
//!   - Results are immutable once produced; caches and snapshots hold
//!     copies.

use crate::{
    baseline::{BaselineProfile, DayImpact},
    cache::{cache_key, ResultCache},
    config::SimConfig,
    error::{RunwayError, RunwayResult},
    path::{PathResult, PathSimulator},
    rng::TrialRng,
    scenario::{ResultSnapshot, Scenario, ScenarioAdjustments},
    stats::{self, ConfidenceIntervals, FanChartBand, Histogram},
    store::{FlowKind, RunwayStore},
    types::ScenarioId,
};
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub iterations: u32,
    pub horizon_days: u32,
    /// Fixed master seed for reproducible runs; None draws from entropy.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub summary: SimulationSummary,
    pub confidence_intervals: ConfidenceIntervals,
    pub fan_chart: Vec<FanChartBand>,
    pub runway_histogram: Histogram,
    pub final_balance_histogram: Histogram,
    pub metadata: SimulationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub iterations: u32,
    pub horizon_days: u32,
    pub scenario_id: Option<ScenarioId>,
    pub starting_balance: f64,
    pub seed: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub burn_rate: BurnRate,
    pub runway: OutcomeBand,
    pub end_balance: OutcomeBand,
    pub risk: RiskMetrics,
}

/// Net burn from the adjusted means (expense minus income).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnRate {
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeBand {
    pub pessimistic: f64, // P10
    pub likely: f64,      // P50
    pub optimistic: f64,  // P90
    pub mean: f64,
    pub uncertainty: f64, // stddev
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub exhaustion_probability: f64,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestOutcome {
    pub label: String,
    pub summary: SimulationSummary,
}

pub struct SimulationOrchestrator {
    store: RunwayStore,
    config: SimConfig,
    cache: Mutex<ResultCache>,
}

impl SimulationOrchestrator {
    pub fn new(store: RunwayStore, config: SimConfig) -> Self {
        let cache = ResultCache::new(
            StdDuration::from_secs(config.cache.result_ttl_secs),
            config.cache.result_capacity,
        );
        Self {
            store,
            config,
            cache: Mutex::new(cache),
        }
    }

    /// Orchestrator over a fresh in-memory store, for callers that
    /// only use the baseline-driven entry points.
    pub fn standalone(config: SimConfig) -> RunwayResult<Self> {
        let store = RunwayStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, config))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn store(&self) -> &RunwayStore {
        &self.store
    }

    // ── Baseline ──────────────────────────────────────────────────

    /// Aggregate the last-90-days ledger history into per-day
    /// mean/stddev, falling back to recurring-item estimates when a
    /// series has fewer than 2 points. Store errors propagate.
    pub fn gather_baseline(&self, account_id: &str) -> RunwayResult<BaselineProfile> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(self.config.baseline_lookback_days);

        let current_balance = self.store.account_balance(account_id)?;

        let (income_mean, income_std) = self.series_stats(
            account_id,
            FlowKind::Income,
            start,
            end,
            self.config.income_volatility,
        )?;
        let (expense_mean, expense_std) = self.series_stats(
            account_id,
            FlowKind::Expense,
            start,
            end,
            self.config.expense_volatility,
        )?;

        log::debug!(
            "baseline for {account_id}: income {income_mean:.2}±{income_std:.2}, \
             expense {expense_mean:.2}±{expense_std:.2}, balance {current_balance:.2}"
        );

        Ok(BaselineProfile {
            current_balance,
            daily_income_mean: income_mean,
            daily_income_std_dev: income_std,
            daily_expense_mean: expense_mean,
            daily_expense_std_dev: expense_std,
            one_time_impacts: vec![],
        })
    }

    fn series_stats(
        &self,
        account_id: &str,
        flow: FlowKind,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
        volatility: f64,
    ) -> RunwayResult<(f64, f64)> {
        let aggregates = self.store.daily_aggregates(account_id, flow, start, end)?;
        if aggregates.len() >= 2 {
            let totals: Vec<f64> = aggregates.iter().map(|a| a.daily_total).collect();
            return Ok((stats::mean(&totals), stats::std_dev(&totals)));
        }

        // Sparse history: derive from recurring monthly estimates.
        let items = self.store.active_items(account_id, flow)?;
        let monthly: f64 = items.iter().map(|i| i.monthly_estimate()).sum();
        let mean = monthly / 30.0;
        Ok((mean, mean * volatility))
    }

    /// Layer scenario adjustments onto a baseline. Absent a scenario
    /// the baseline comes back unmodified.
    pub fn apply_scenario(
        &self,
        baseline: &BaselineProfile,
        scenario: Option<&Scenario>,
    ) -> BaselineProfile {
        let mut adjusted = baseline.clone();
        let Some(scenario) = scenario else {
            return adjusted;
        };
        Self::apply_adjustments(&mut adjusted, &scenario.adjustments);
        adjusted
    }

    fn apply_adjustments(baseline: &mut BaselineProfile, adjustments: &ScenarioAdjustments) {
        if let Some(pct) = adjustments.income_change_pct {
            baseline.daily_income_mean *= 1.0 + pct / 100.0;
        }
        if let Some(pct) = adjustments.expense_change_pct {
            baseline.daily_expense_mean *= 1.0 + pct / 100.0;
        }
        baseline
            .one_time_impacts
            .extend(adjustments.one_time_impacts.iter().cloned());
    }

    // ── Simulation ────────────────────────────────────────────────

    /// Full pipeline for an account: gather, adjust, simulate, and
    /// (for scenario runs) persist the snapshot. Cached by parameters.
    pub fn run_simulation(
        &self,
        account_id: &str,
        scenario_id: Option<&str>,
        options: &SimulationOptions,
    ) -> RunwayResult<SimulationResult> {
        let key = cache_key(account_id, scenario_id, options);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                log::debug!("simulation cache hit for {key}");
                return Ok(hit);
            }
        }

        let baseline = self.gather_baseline(account_id)?;
        let scenario = scenario_id
            .map(|id| self.store.get_scenario(id))
            .transpose()?;
        let adjusted = self.apply_scenario(&baseline, scenario.as_ref());

        let result = self.run_with_baseline(&adjusted, scenario_id, options)?;

        if let Some(scenario) = &scenario {
            self.store.update_snapshot(
                &scenario.scenario_id,
                result.metadata.generated_at,
                &snapshot_of(&result),
            )?;
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.set(key, result.clone());
        }
        Ok(result)
    }

    /// Monte Carlo core: N independent trials over an already-adjusted
    /// baseline, aggregated into a SimulationResult.
    pub fn run_with_baseline(
        &self,
        baseline: &BaselineProfile,
        scenario_id: Option<&str>,
        options: &SimulationOptions,
    ) -> RunwayResult<SimulationResult> {
        if options.iterations == 0 {
            return Err(RunwayError::InvalidOptions {
                reason: "iterations must be >= 1".into(),
            });
        }
        if options.horizon_days == 0 {
            return Err(RunwayError::InvalidOptions {
                reason: "horizon_days must be >= 1".into(),
            });
        }

        let seed = options.seed.unwrap_or_else(rand::random);
        let start = Utc::now().date_naive();
        let impacts: Vec<DayImpact> = baseline
            .one_time_impacts
            .iter()
            .filter_map(|i| i.to_day_impact(start, options.horizon_days))
            .collect();

        let simulator = PathSimulator::new(&self.config);
        let trials: Vec<PathResult> = (0..u64::from(options.iterations))
            .into_par_iter()
            .map(|trial| {
                let mut rng = TrialRng::for_trial(seed, trial);
                simulator.simulate(baseline, options.horizon_days, &impacts, &mut rng)
            })
            .collect();

        let runways: Vec<f64> = trials.iter().map(|t| f64::from(t.runway_days)).collect();
        let finals: Vec<f64> = trials.iter().map(|t| t.final_balance).collect();
        let paths: Vec<Vec<f64>> = trials.into_iter().map(|t| t.daily_balances).collect();

        // Short-horizon runs censor every runway below the reference,
        // which would read as certain exhaustion. Clamp the reference
        // to the simulated horizon.
        let reference = self.config.reference_horizon_days.min(options.horizon_days);
        let confidence_intervals = ConfidenceIntervals {
            runway_days: stats::distribution_stats(&runways),
            final_balance: stats::distribution_stats(&finals),
            exhaustion_probability: stats::exhaustion_probability(&runways, reference),
        };

        let summary = self.generate_summary(baseline, &confidence_intervals);
        let result = SimulationResult {
            summary,
            fan_chart: stats::fan_chart(&paths, options.horizon_days),
            runway_histogram: stats::histogram(&runways, self.config.histogram_bins),
            final_balance_histogram: stats::histogram(&finals, self.config.histogram_bins),
            confidence_intervals,
            metadata: SimulationMetadata {
                iterations: options.iterations,
                horizon_days: options.horizon_days,
                scenario_id: scenario_id.map(str::to_string),
                starting_balance: baseline.current_balance,
                seed,
                generated_at: Utc::now(),
            },
        };
        Ok(result)
    }

    /// Burn rate from the adjusted means plus percentile bands over
    /// both outcome distributions.
    pub fn generate_summary(
        &self,
        adjusted: &BaselineProfile,
        ci: &ConfidenceIntervals,
    ) -> SimulationSummary {
        let daily_burn = adjusted.daily_expense_mean - adjusted.daily_income_mean;
        SimulationSummary {
            burn_rate: BurnRate {
                daily: daily_burn,
                weekly: daily_burn * 7.0,
                monthly: daily_burn * 30.0,
            },
            runway: band(&ci.runway_days),
            end_balance: band(&ci.final_balance),
            risk: RiskMetrics {
                exhaustion_probability: ci.exhaustion_probability,
                value_at_risk: ci.final_balance.var95,
                expected_shortfall: ci.final_balance.cvar95,
            },
        }
    }

    /// Reduced-iteration, short-horizon run for low-latency alert
    /// checks. Same pipeline, smaller knobs.
    pub fn quick_simulation(
        &self,
        account_id: &str,
        iterations: Option<u32>,
    ) -> RunwayResult<SimulationResult> {
        let options = SimulationOptions {
            iterations: iterations.unwrap_or(self.config.quick_iterations),
            horizon_days: self.config.quick_horizon_days,
            seed: None,
        };
        self.run_simulation(account_id, None, &options)
    }

    /// Three fixed adverse scenarios for tail-risk characterization.
    pub fn run_stress_test(&self, account_id: &str) -> RunwayResult<Vec<StressTestOutcome>> {
        let baseline = self.gather_baseline(account_id)?;
        let presets = [
            ("income_down_50", Some(-50.0), None),
            ("expense_up_30", None, Some(30.0)),
            ("combined", Some(-50.0), Some(30.0)),
        ];
        let options = SimulationOptions {
            iterations: self.config.stress_iterations,
            horizon_days: self.config.default_horizon_days,
            seed: None,
        };

        let mut outcomes = Vec::with_capacity(presets.len());
        for (label, income_pct, expense_pct) in presets {
            let mut adjusted = baseline.clone();
            Self::apply_adjustments(
                &mut adjusted,
                &ScenarioAdjustments {
                    income_change_pct: income_pct,
                    expense_change_pct: expense_pct,
                    one_time_impacts: vec![],
                },
            );
            let result = self.run_with_baseline(&adjusted, None, &options)?;
            outcomes.push(StressTestOutcome {
                label: label.to_string(),
                summary: result.summary,
            });
        }
        Ok(outcomes)
    }

    // ── Cache control ─────────────────────────────────────────────

    /// Drop cached results for one account. Called on financial-state
    /// mutation.
    pub fn invalidate_cache(&self, account_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate_account(account_id);
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

/// The persistent snapshot slice of a full result.
pub fn snapshot_of(result: &SimulationResult) -> ResultSnapshot {
    ResultSnapshot {
        summary: result.summary.clone(),
        confidence_intervals: result.confidence_intervals.clone(),
    }
}

fn band(d: &crate::stats::DistributionStats) -> OutcomeBand {
    OutcomeBand {
        pessimistic: d.p10,
        likely: d.p50,
        optimistic: d.p90,
        mean: d.mean,
        uncertainty: d.std_dev,
    }
}

//! Baseline financial profile: the per-account inputs every path
//! trial draws from.
//!
//! Derived once per simulation run from 90-day ledger aggregates, with
//! a recurring-item fallback when history is sparse (see
//! `SimulationOrchestrator::gather_baseline`). Scenario adjustments are
//! applied to a copy; the gathered baseline itself is never mutated.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub current_balance: f64,
    pub daily_income_mean: f64,
    pub daily_income_std_dev: f64,
    pub daily_expense_mean: f64,
    pub daily_expense_std_dev: f64,
    /// One-time impacts carried into the simulation, calendar-dated.
    pub one_time_impacts: Vec<OneTimeImpact>,
}

/// A dated, signed one-off cash event. Positive amounts add income on
/// that day; negative amounts add expense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeImpact {
    pub date: NaiveDate,
    pub amount: f64,
}

/// The same impact, resolved to a 1-based day offset within the
/// simulation horizon. Pure simulator input with no calendar awareness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayImpact {
    pub day: u32,
    pub amount: f64,
}

impl OneTimeImpact {
    /// Resolve to a day offset relative to `start` (day 1 = the first
    /// simulated day). Impacts on or before `start`, or beyond the
    /// horizon, return None and are dropped by the caller.
    pub fn to_day_impact(&self, start: NaiveDate, horizon_days: u32) -> Option<DayImpact> {
        let offset = (self.date - start).num_days();
        if offset < 1 || offset > i64::from(horizon_days) {
            return None;
        }
        Some(DayImpact {
            day: offset as u32,
            amount: self.amount,
        })
    }
}

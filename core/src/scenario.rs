//! Scenario entities: named what-if adjustments layered onto a
//! baseline before simulation.
//!
//! Scenarios are owned by the account, mutated by orchestrator runs
//! (last_run_at + snapshot), and read by the alert path for freshness
//! before triggering a fresh computation.

use crate::{baseline::OneTimeImpact, types::ScenarioId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: ScenarioId,
    pub account_id: String,
    pub name: String,
    pub adjustments: ScenarioAdjustments,
    pub config: ScenarioConfig,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_snapshot: Option<ResultSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioAdjustments {
    /// Percentage change applied to the daily income mean, e.g. -50.0.
    #[serde(default)]
    pub income_change_pct: Option<f64>,
    /// Percentage change applied to the daily expense mean, e.g. 30.0.
    #[serde(default)]
    pub expense_change_pct: Option<f64>,
    #[serde(default)]
    pub one_time_impacts: Vec<OneTimeImpact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub iterations: u32,
    pub horizon_days: u32,
}

/// Persistent snapshot of a scenario's most recent run. Kept separate
/// from the short-TTL result cache: snapshots survive restarts and
/// feed the stale-scenario refresh query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub summary: crate::orchestrator::SimulationSummary,
    pub confidence_intervals: crate::stats::ConfidenceIntervals,
}

impl Scenario {
    pub fn new(account_id: &str, name: &str, adjustments: ScenarioAdjustments) -> Self {
        Self {
            scenario_id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            name: name.to_string(),
            adjustments,
            config: ScenarioConfig {
                iterations: 5_000,
                horizon_days: 365,
            },
            last_run_at: None,
            last_snapshot: None,
        }
    }

    /// True when the stored snapshot is younger than `max_age_hours`.
    pub fn snapshot_fresh(&self, now: DateTime<Utc>, max_age_hours: i64) -> bool {
        match (&self.last_run_at, &self.last_snapshot) {
            (Some(ran), Some(_)) => (now - *ran).num_hours() < max_age_hours,
            _ => false,
        }
    }
}

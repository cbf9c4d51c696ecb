//! Tunable knobs for the simulation, nightly batch, caches, and alerts.
//!
//! Everything here is plain data. Production callers use
//! `SimConfig::default()`; tests use `SimConfig::default_test()` which
//! shrinks iteration counts and removes pacing delays.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Lookback window for historical daily aggregates.
    pub baseline_lookback_days: i64,
    /// Income stddev fallback = mean * this, when history is sparse.
    pub income_volatility: f64,
    /// Expense stddev fallback = mean * this, when history is sparse.
    pub expense_volatility: f64,
    /// Probability that an independent expense shock fires on a given day.
    pub shock_probability: f64,
    /// Shock size is drawn uniformly from [shock_min, shock_max].
    pub shock_min: f64,
    pub shock_max: f64,
    /// Runways shorter than this count toward exhaustion probability.
    pub reference_horizon_days: u32,
    /// Bin count for result histograms.
    pub histogram_bins: usize,
    /// Defaults for ad-hoc runs.
    pub default_iterations: u32,
    pub default_horizon_days: u32,
    /// Quick path used by the alert gate.
    pub quick_iterations: u32,
    pub quick_horizon_days: u32,
    /// Iterations per stress-test scenario.
    pub stress_iterations: u32,

    pub nightly: NightlyConfig,
    pub cache: CacheConfig,
    pub alerts: AlertThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightlyConfig {
    /// Accounts per batch; also the per-batch concurrency bound.
    pub batch_size: usize,
    /// Pause between successive batches, to bound resource pressure.
    pub inter_batch_delay_ms: u64,
    /// Iteration count for the nightly baseline run, and the cap
    /// applied to user-defined scenario iteration counts.
    pub iterations: u32,
    pub horizon_days: u32,
    /// Eligibility: active within this many days, capped at `account_cap`.
    pub active_within_days: i64,
    pub account_cap: usize,
    /// Conservative cap when the eligibility query cannot be served.
    pub fallback_account_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Simulation result cache.
    pub result_ttl_secs: u64,
    pub result_capacity: usize,
    /// Per-account alert cache.
    pub alert_ttl_secs: u64,
    /// Scenario snapshots older than this are considered stale.
    pub snapshot_stale_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// P10 runway cutoffs, in days, checked in severity order.
    pub critical_runway_days: f64,
    pub warning_runway_days: f64,
    pub caution_runway_days: f64,
    /// Exhaustion probability cutoffs, in percent.
    pub critical_exhaustion_pct: f64,
    pub warning_exhaustion_pct: f64,
    /// (P50 - P10) gap that triggers the volatility recommendation.
    pub volatility_gap_days: f64,
    pub max_recommendations: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            baseline_lookback_days: 90,
            income_volatility: 0.15,
            expense_volatility: 0.20,
            shock_probability: 0.02,
            shock_min: 100.0,
            shock_max: 500.0,
            reference_horizon_days: 90,
            histogram_bins: 30,
            default_iterations: 10_000,
            default_horizon_days: 365,
            quick_iterations: 1_000,
            quick_horizon_days: 30,
            stress_iterations: 2_000,
            nightly: NightlyConfig {
                batch_size: 10,
                inter_batch_delay_ms: 250,
                iterations: 10_000,
                horizon_days: 365,
                active_within_days: 30,
                account_cap: 500,
                fallback_account_cap: 100,
            },
            cache: CacheConfig {
                result_ttl_secs: 300,
                result_capacity: 100,
                alert_ttl_secs: 3_600,
                snapshot_stale_hours: 24,
            },
            alerts: AlertThresholds::default(),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical_runway_days: 7.0,
            warning_runway_days: 14.0,
            caution_runway_days: 30.0,
            critical_exhaustion_pct: 75.0,
            warning_exhaustion_pct: 50.0,
            volatility_gap_days: 30.0,
            max_recommendations: 5,
        }
    }
}

impl SimConfig {
    /// Config with small iteration counts and no pacing, for tests.
    pub fn default_test() -> Self {
        let mut cfg = Self::default();
        cfg.default_iterations = 500;
        cfg.default_horizon_days = 90;
        cfg.quick_iterations = 200;
        cfg.stress_iterations = 300;
        cfg.nightly.batch_size = 2;
        cfg.nightly.inter_batch_delay_ms = 0;
        cfg.nightly.iterations = 300;
        cfg.nightly.horizon_days = 90;
        cfg
    }
}

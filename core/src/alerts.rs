//! Runway alerting: threshold evaluation over simulation output.
//!
//! RULES:
//!   - Severity merging is escalate-only. Independent checks within one
//!     evaluation may raise the level, never lower it.
//!   - Evaluation failures degrade to an explicit Unknown record with
//!     error set, never a thrown error. Fail-open by default.
//!   - The circuit breaker only denies operations when explicitly
//!     configured non-warn-only AND the level is critical.

use crate::{
    config::AlertThresholds,
    error::RunwayResult,
    orchestrator::{SimulationOrchestrator, SimulationResult},
    scenario::Scenario,
    stats::ConfidenceIntervals,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Ordered severity lattice. Unknown sits below Safe so a max-merge
/// over real threshold checks can never produce it; it is only set
/// explicitly on the degraded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Unknown,
    Safe,
    Caution,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub level: AlertLevel,
    pub message: String,
    pub p10_runway: f64,
    pub p50_runway: f64,
    pub exhaustion_probability: f64,
    pub flags: Vec<String>,
    pub recommendations: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
    pub error: bool,
}

impl AlertRecord {
    fn unknown(reason: &str) -> Self {
        Self {
            level: AlertLevel::Unknown,
            message: format!("runway status unavailable: {reason}"),
            p10_runway: 0.0,
            p50_runway: 0.0,
            exhaustion_probability: 0.0,
            flags: vec!["evaluation_failed".into()],
            recommendations: vec![],
            evaluated_at: Utc::now(),
            error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerOptions {
    pub block_expenses: bool,
    pub block_subscriptions: bool,
    /// When true (the default) the breaker only attaches a warning and
    /// never denies anything.
    pub warn_only: bool,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            block_expenses: false,
            block_subscriptions: false,
            warn_only: true,
        }
    }
}

/// Gate result consumed by an external request handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerDecision {
    pub level: AlertLevel,
    /// Non-blocking signal attached whenever the level is elevated.
    pub warning: Option<String>,
    /// Operation kinds to deny. Empty unless enforcement is configured
    /// and the level is critical.
    pub blocked_operations: Vec<String>,
}

impl CircuitBreakerDecision {
    pub fn blocks(&self, operation: &str) -> bool {
        self.blocked_operations.iter().any(|op| op == operation)
    }
}

pub struct AlertEvaluator {
    orchestrator: SimulationOrchestrator,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, AlertRecord)>>,
}

impl AlertEvaluator {
    pub fn new(orchestrator: SimulationOrchestrator) -> Self {
        let ttl = Duration::from_secs(orchestrator.config().cache.alert_ttl_secs);
        Self {
            orchestrator,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &SimulationOrchestrator {
        &self.orchestrator
    }

    /// Current alert state for an account. Served from the hourly
    /// cache when possible, then from a fresh (<24h) scenario
    /// snapshot, then from a quick simulation. Failures come back as
    /// an Unknown record, never an Err.
    pub fn check_runway_alerts(&self, account_id: &str) -> AlertRecord {
        if let Ok(cache) = self.cache.lock() {
            if let Some((inserted, record)) = cache.get(account_id) {
                if inserted.elapsed() < self.ttl {
                    return record.clone();
                }
            }
        }

        let record = match self.gather_intervals(account_id) {
            Ok(ci) => evaluate_alerts(&self.orchestrator.config().alerts, &ci),
            Err(e) => {
                log::warn!("alert evaluation failed for {account_id}: {e}");
                AlertRecord::unknown(&e.to_string())
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(account_id.to_string(), (Instant::now(), record.clone()));
        }
        record
    }

    /// Freshest available statistics: a scenario snapshot younger than
    /// the staleness bound wins over recomputation.
    fn gather_intervals(&self, account_id: &str) -> RunwayResult<ConfidenceIntervals> {
        let stale_hours = self.orchestrator.config().cache.snapshot_stale_hours;
        let now = Utc::now();

        let scenarios = self.orchestrator.store().scenarios_for_account(account_id)?;
        if let Some(snapshot) = freshest_snapshot(&scenarios, now, stale_hours) {
            log::debug!("alert check for {account_id} served from scenario snapshot");
            return Ok(snapshot);
        }

        let result: SimulationResult = self.orchestrator.quick_simulation(account_id, None)?;
        Ok(result.confidence_intervals)
    }

    /// Gate for mutating operations. Fail-open: an Unknown level never
    /// blocks, and warn-only mode never blocks.
    pub fn circuit_breaker(
        &self,
        account_id: &str,
        options: &CircuitBreakerOptions,
    ) -> CircuitBreakerDecision {
        let record = self.check_runway_alerts(account_id);

        let warning = match record.level {
            AlertLevel::Safe | AlertLevel::Unknown => None,
            _ => Some(format!(
                "runway status is {}: {}",
                record.level.as_str(),
                record.message
            )),
        };

        let mut blocked_operations = Vec::new();
        if !options.warn_only && record.level == AlertLevel::Critical {
            if options.block_expenses {
                blocked_operations.push("expense".to_string());
            }
            if options.block_subscriptions {
                blocked_operations.push("subscription".to_string());
            }
        }

        CircuitBreakerDecision {
            level: record.level,
            warning,
            blocked_operations,
        }
    }

    /// Drop the cached alert for one account. Called on
    /// financial-state mutation.
    pub fn invalidate(&self, account_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(account_id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

fn freshest_snapshot(
    scenarios: &[Scenario],
    now: DateTime<Utc>,
    stale_hours: i64,
) -> Option<ConfidenceIntervals> {
    scenarios
        .iter()
        .filter(|s| s.snapshot_fresh(now, stale_hours))
        .max_by_key(|s| s.last_run_at)
        .and_then(|s| s.last_snapshot.as_ref())
        .map(|snap| snap.confidence_intervals.clone())
}

/// Pure threshold mapping from confidence intervals to an alert
/// record. Checks escalate only; no later check lowers the level.
pub fn evaluate_alerts(thresholds: &AlertThresholds, ci: &ConfidenceIntervals) -> AlertRecord {
    let p10 = ci.runway_days.p10;
    let p50 = ci.runway_days.p50;
    let exhaustion = ci.exhaustion_probability;

    let mut level = AlertLevel::Safe;
    let mut flags = Vec::new();
    let mut recommendations = Vec::new();
    let mut urgent = Vec::new();

    // Runway thresholds, checked in severity order; first match wins.
    if p10 < thresholds.critical_runway_days {
        level = AlertLevel::Critical;
        flags.push("runway_critical".to_string());
        urgent.push(format!(
            "Pessimistic runway is under {} days. Reduce discretionary spending immediately.",
            thresholds.critical_runway_days
        ));
    } else if p10 < thresholds.warning_runway_days {
        level = AlertLevel::Warning;
        flags.push("runway_warning".to_string());
        recommendations.push(format!(
            "Pessimistic runway is under {} days. Review upcoming expenses.",
            thresholds.warning_runway_days
        ));
    } else if p10 < thresholds.caution_runway_days {
        level = AlertLevel::Caution;
        flags.push("runway_caution".to_string());
        recommendations.push("Runway is tightening. Consider building a cash buffer.".to_string());
    }

    // Exhaustion probability escalates independently.
    if exhaustion >= thresholds.critical_exhaustion_pct {
        if level < AlertLevel::Critical {
            level = AlertLevel::Critical;
        }
        flags.push("exhaustion_critical".to_string());
        urgent.push(format!(
            "Probability of running out of funds is {exhaustion:.0}%. Act now."
        ));
    } else if exhaustion >= thresholds.warning_exhaustion_pct {
        // Escalates from Safe only; never touches an existing
        // Caution/Warning/Critical.
        if level == AlertLevel::Safe {
            level = AlertLevel::Warning;
        }
        flags.push("exhaustion_elevated".to_string());
        recommendations.push(format!(
            "Probability of running out of funds is {exhaustion:.0}%. Monitor cash flow closely."
        ));
    }

    // Wide P10..P50 spread signals volatile outcomes.
    if level != AlertLevel::Safe && (p50 - p10) > thresholds.volatility_gap_days {
        flags.push("high_volatility".to_string());
        recommendations.push(
            "Outcomes vary widely between runs. Stabilizing income or expenses would \
             narrow the range."
                .to_string(),
        );
    }

    // Urgent recommendations lead; total list is capped.
    let mut combined = urgent;
    combined.extend(recommendations);
    combined.truncate(thresholds.max_recommendations);

    let message = match level {
        AlertLevel::Critical => format!("Critical: pessimistic runway {p10:.0} days."),
        AlertLevel::Warning => format!("Warning: pessimistic runway {p10:.0} days."),
        AlertLevel::Caution => format!("Caution: pessimistic runway {p10:.0} days."),
        AlertLevel::Safe => "Runway looks healthy.".to_string(),
        AlertLevel::Unknown => "Runway status unavailable.".to_string(),
    };

    AlertRecord {
        level,
        message,
        p10_runway: p10,
        p50_runway: p50,
        exhaustion_probability: exhaustion,
        flags,
        recommendations: combined,
        evaluated_at: Utc::now(),
        error: false,
    }
}

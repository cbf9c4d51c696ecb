//! Alert evaluation: threshold mapping, escalate-only merging, unknown
//! degradation, the circuit-breaker gate, and the per-account cache.

use chrono::Utc;
use runway_core::{
    alerts::{evaluate_alerts, AlertEvaluator, AlertLevel, CircuitBreakerOptions},
    config::{AlertThresholds, SimConfig},
    orchestrator::{BurnRate, OutcomeBand, RiskMetrics, SimulationOrchestrator, SimulationSummary},
    scenario::{ResultSnapshot, Scenario, ScenarioAdjustments},
    stats::{ConfidenceIntervals, DistributionStats},
};

fn dist(p10: f64, p50: f64) -> DistributionStats {
    DistributionStats {
        p10,
        p25: (p10 + p50) / 2.0,
        p50,
        p75: p50 + 10.0,
        p90: p50 + 20.0,
        mean: p50,
        std_dev: 5.0,
        var95: p10,
        cvar95: p10,
    }
}

fn intervals(p10_runway: f64, p50_runway: f64, exhaustion: f64) -> ConfidenceIntervals {
    ConfidenceIntervals {
        runway_days: dist(p10_runway, p50_runway),
        final_balance: dist(-500.0, 1_000.0),
        exhaustion_probability: exhaustion,
    }
}

fn snapshot(p10_runway: f64, p50_runway: f64, exhaustion: f64) -> ResultSnapshot {
    let ci = intervals(p10_runway, p50_runway, exhaustion);
    ResultSnapshot {
        summary: SimulationSummary {
            burn_rate: BurnRate {
                daily: 10.0,
                weekly: 70.0,
                monthly: 300.0,
            },
            runway: OutcomeBand {
                pessimistic: p10_runway,
                likely: p50_runway,
                optimistic: p50_runway + 20.0,
                mean: p50_runway,
                uncertainty: 5.0,
            },
            end_balance: OutcomeBand {
                pessimistic: -500.0,
                likely: 1_000.0,
                optimistic: 2_000.0,
                mean: 1_000.0,
                uncertainty: 5.0,
            },
            risk: RiskMetrics {
                exhaustion_probability: exhaustion,
                value_at_risk: -500.0,
                expected_shortfall: -650.0,
            },
        },
        confidence_intervals: ci,
    }
}

/// Evaluator whose account has a fresh scenario snapshot, so alert
/// checks never recompute.
fn evaluator_with_snapshot(account_id: &str, snap: ResultSnapshot) -> AlertEvaluator {
    let orch = SimulationOrchestrator::standalone(SimConfig::default_test()).expect("orchestrator");
    let mut scenario = Scenario::new(account_id, "what-if", ScenarioAdjustments::default());
    scenario.last_run_at = Some(Utc::now());
    scenario.last_snapshot = Some(snap);
    orch.store().insert_scenario(&scenario).expect("insert");
    AlertEvaluator::new(orch)
}

// ── Pure threshold mapping ────────────────────────────────────────

#[test]
fn p10_below_seven_days_is_critical() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(5.0, 40.0, 10.0));
    assert_eq!(record.level, AlertLevel::Critical);
    assert!(record.flags.contains(&"runway_critical".to_string()));
    assert!(!record.error);
}

#[test]
fn p10_below_fourteen_days_is_warning() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(10.0, 40.0, 10.0));
    assert_eq!(record.level, AlertLevel::Warning);
}

#[test]
fn p10_below_thirty_days_is_caution() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(20.0, 40.0, 10.0));
    assert_eq!(record.level, AlertLevel::Caution);
}

#[test]
fn comfortable_runway_is_safe() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(60.0, 80.0, 10.0));
    assert_eq!(record.level, AlertLevel::Safe);
    assert!(record.flags.is_empty());
}

/// Exhaustion >= 75% forces critical regardless of runway numbers.
#[test]
fn high_exhaustion_forces_critical() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(60.0, 80.0, 80.0));
    assert_eq!(record.level, AlertLevel::Critical);
    assert!(record.flags.contains(&"exhaustion_critical".to_string()));
}

/// Exhaustion >= 50% escalates only from Safe. An existing Caution
/// from the runway check is left alone.
#[test]
fn moderate_exhaustion_escalates_safe_only() {
    let thresholds = AlertThresholds::default();

    let from_safe = evaluate_alerts(&thresholds, &intervals(60.0, 80.0, 60.0));
    assert_eq!(from_safe.level, AlertLevel::Warning);

    let from_caution = evaluate_alerts(&thresholds, &intervals(20.0, 40.0, 60.0));
    assert_eq!(
        from_caution.level,
        AlertLevel::Caution,
        "moderate exhaustion must not touch an already-set caution"
    );
    assert!(from_caution
        .flags
        .contains(&"exhaustion_elevated".to_string()));
}

/// Checks never lower the level: critical runway + moderate exhaustion
/// stays critical.
#[test]
fn merging_never_downgrades() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(5.0, 40.0, 60.0));
    assert_eq!(record.level, AlertLevel::Critical);
}

/// A wide P10..P50 spread on a non-safe level appends a volatility
/// recommendation.
#[test]
fn volatility_gap_adds_recommendation() {
    let thresholds = AlertThresholds::default();

    let volatile = evaluate_alerts(&thresholds, &intervals(10.0, 50.0, 10.0));
    assert!(volatile.flags.contains(&"high_volatility".to_string()));

    let tight = evaluate_alerts(&thresholds, &intervals(10.0, 20.0, 10.0));
    assert!(!tight.flags.contains(&"high_volatility".to_string()));

    // Safe level never gets the volatility flag even with a wide gap.
    let safe = evaluate_alerts(&thresholds, &intervals(60.0, 120.0, 10.0));
    assert!(!safe.flags.contains(&"high_volatility".to_string()));
}

/// Urgent recommendations lead the list; the total is capped at 5.
#[test]
fn recommendations_capped_with_urgent_first() {
    let record = evaluate_alerts(&AlertThresholds::default(), &intervals(5.0, 50.0, 80.0));
    assert!(record.recommendations.len() <= 5);
    assert!(
        record.recommendations[0].contains("immediately"),
        "urgent recommendation must come first, got: {:?}",
        record.recommendations
    );
}

// ── Evaluator pipeline ────────────────────────────────────────────

/// A fresh scenario snapshot short-circuits recomputation and drives
/// the alert level.
#[test]
fn fresh_snapshot_feeds_alert_check() {
    let evaluator = evaluator_with_snapshot("acct-snap", snapshot(5.0, 40.0, 80.0));
    let record = evaluator.check_runway_alerts("acct-snap");
    assert_eq!(record.level, AlertLevel::Critical);
    assert!(!record.error);
}

/// Missing data degrades to an explicit Unknown record, never an Err.
#[test]
fn missing_account_degrades_to_unknown() {
    let orch = SimulationOrchestrator::standalone(SimConfig::default_test()).expect("orchestrator");
    let evaluator = AlertEvaluator::new(orch);
    let record = evaluator.check_runway_alerts("no-such-account");
    assert_eq!(record.level, AlertLevel::Unknown);
    assert!(record.error);
    assert!(record.flags.contains(&"evaluation_failed".to_string()));
}

/// Results are served from the per-account cache until invalidated.
#[test]
fn alert_cache_serves_until_invalidated() {
    let evaluator = evaluator_with_snapshot("acct-cache", snapshot(5.0, 40.0, 80.0));
    assert_eq!(
        evaluator.check_runway_alerts("acct-cache").level,
        AlertLevel::Critical
    );

    // Refresh the snapshot to a healthy state; the cached critical
    // record must still be served.
    let store = evaluator.orchestrator().store();
    let scenario_id = store
        .scenarios_for_account("acct-cache")
        .expect("scenarios")[0]
        .scenario_id
        .clone();
    store
        .update_snapshot(&scenario_id, Utc::now(), &snapshot(60.0, 80.0, 5.0))
        .expect("update");
    assert_eq!(
        evaluator.check_runway_alerts("acct-cache").level,
        AlertLevel::Critical,
        "cached record should survive the data change"
    );

    evaluator.invalidate("acct-cache");
    assert_eq!(
        evaluator.check_runway_alerts("acct-cache").level,
        AlertLevel::Safe,
        "invalidation must force a re-read"
    );
}

// ── Circuit breaker ───────────────────────────────────────────────

/// Default (warn-only) mode attaches a warning and blocks nothing,
/// even at critical.
#[test]
fn circuit_breaker_warn_only_never_blocks() {
    let evaluator = evaluator_with_snapshot("acct-warn", snapshot(5.0, 40.0, 80.0));
    let decision = evaluator.circuit_breaker("acct-warn", &CircuitBreakerOptions::default());
    assert_eq!(decision.level, AlertLevel::Critical);
    assert!(decision.warning.is_some());
    assert!(decision.blocked_operations.is_empty());
    assert!(!decision.blocks("expense"));
}

/// Enforced mode denies the configured operation kinds at critical.
#[test]
fn circuit_breaker_enforced_blocks_at_critical() {
    let evaluator = evaluator_with_snapshot("acct-block", snapshot(5.0, 40.0, 80.0));
    let options = CircuitBreakerOptions {
        block_expenses: true,
        block_subscriptions: true,
        warn_only: false,
    };
    let decision = evaluator.circuit_breaker("acct-block", &options);
    assert!(decision.blocks("expense"));
    assert!(decision.blocks("subscription"));
}

/// Enforcement only bites at critical; a warning level passes through.
#[test]
fn circuit_breaker_enforced_ignores_non_critical() {
    let evaluator = evaluator_with_snapshot("acct-pass", snapshot(10.0, 20.0, 10.0));
    let options = CircuitBreakerOptions {
        block_expenses: true,
        block_subscriptions: true,
        warn_only: false,
    };
    let decision = evaluator.circuit_breaker("acct-pass", &options);
    assert_eq!(decision.level, AlertLevel::Warning);
    assert!(decision.blocked_operations.is_empty());
    assert!(decision.warning.is_some());
}

/// An Unknown level fails open: nothing blocked, no warning attached.
#[test]
fn circuit_breaker_fails_open_on_unknown() {
    let orch = SimulationOrchestrator::standalone(SimConfig::default_test()).expect("orchestrator");
    let evaluator = AlertEvaluator::new(orch);
    let options = CircuitBreakerOptions {
        block_expenses: true,
        block_subscriptions: true,
        warn_only: false,
    };
    let decision = evaluator.circuit_breaker("no-such-account", &options);
    assert_eq!(decision.level, AlertLevel::Unknown);
    assert!(decision.blocked_operations.is_empty());
    assert!(decision.warning.is_none());
}

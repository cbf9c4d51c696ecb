//! Nightly batch pass: mutual exclusion, failure isolation, health
//! enrichment, and stats retention.
//!
//! Stores use shared-cache in-memory URIs so the per-worker reopened
//! connections see the same database as the coordinator.

use chrono::Utc;
use runway_core::{
    config::SimConfig,
    scenario::{Scenario, ScenarioAdjustments},
    scheduler::{BatchScheduler, RunOutcome},
    store::{FlowKind, RunwayStore},
};

fn shared_store(name: &str) -> RunwayStore {
    let uri = format!("file:{name}?mode=memory&cache=shared");
    let store = RunwayStore::open(&uri).expect("open shared store");
    store.migrate().expect("migrate");
    store
}

fn seed_account(store: &RunwayStore, account_id: &str, balance: f64) {
    let today = Utc::now().date_naive();
    store
        .insert_account(account_id, balance, today, today)
        .expect("insert account");
}

fn completed(outcome: RunOutcome) -> runway_core::scheduler::RunStats {
    match outcome {
        RunOutcome::Completed(stats) => stats,
        RunOutcome::Skipped => panic!("expected a completed run"),
    }
}

/// A second run() while one is active returns Skipped immediately and
/// leaves the first run's stats as the latest.
#[test]
fn concurrent_run_is_skipped() {
    let store = shared_store("sched_mutex");
    seed_account(&store, "m-1", 5_000.0);
    seed_account(&store, "m-2", 5_000.0);

    let mut cfg = SimConfig::default_test();
    cfg.nightly.batch_size = 1;
    cfg.nightly.inter_batch_delay_ms = 500; // hold the run open

    let scheduler = BatchScheduler::new(store, cfg);
    std::thread::scope(|scope| {
        let first = scope.spawn(|| scheduler.run().expect("first run"));

        // Wait for the spawned run to take the flag; its inter-batch
        // pause then holds the window open for the contending call.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !scheduler.is_running() {
            assert!(
                std::time::Instant::now() < deadline,
                "spawned run never started"
            );
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let second = scheduler.run().expect("second run");
        assert!(second.is_skipped(), "overlapping run must be skipped");

        let stats = completed(first.join().expect("join"));
        assert_eq!(stats.users_processed, 2);
    });

    let retained = scheduler.last_run_stats().expect("stats retained");
    assert_eq!(retained.users_processed, 2, "skip must not overwrite stats");

    // The flag is clear again: a fresh run completes.
    let rerun = completed(scheduler.run().expect("rerun"));
    assert_eq!(rerun.users_processed, 2);
}

/// One scenario's failure is recorded and never aborts the account's
/// other scenarios or the base run.
#[test]
fn scenario_failure_is_isolated() {
    let store = shared_store("sched_isolation");
    seed_account(&store, "iso-1", 5_000.0);

    let mut good = Scenario::new("iso-1", "plausible", ScenarioAdjustments::default());
    good.config.iterations = 50;
    good.config.horizon_days = 30;
    store.insert_scenario(&good).expect("insert good");

    let mut bad = Scenario::new("iso-1", "misconfigured", ScenarioAdjustments::default());
    bad.config.iterations = 0; // rejected by the simulation core
    bad.config.horizon_days = 30;
    store.insert_scenario(&bad).expect("insert bad");

    let mut cfg = SimConfig::default_test();
    cfg.nightly.batch_size = 1;
    let scheduler = BatchScheduler::new(store, cfg);
    let stats = completed(scheduler.run().expect("run"));

    assert_eq!(stats.users_processed, 1);
    assert_eq!(stats.scenarios_processed, 1, "good scenario still ran");
    assert_eq!(stats.errors.len(), 1);
    assert!(
        stats.errors[0].contains(&bad.scenario_id),
        "error should name the failing scenario: {:?}",
        stats.errors
    );

    // The scheduler owns its store; reattach via the shared URI. The
    // good scenario's snapshot was persisted.
    let refreshed = shared_store("sched_isolation")
        .get_scenario(&good.scenario_id)
        .expect("get scenario");
    assert!(refreshed.last_run_at.is_some());
    assert!(refreshed.last_snapshot.is_some());
}

/// A distressed account gets risk factors and a metrics block appended
/// to its pre-existing health record; accounts without a record are
/// skipped, not given one.
#[test]
fn health_enrichment_appends_and_skips() {
    let store = shared_store("sched_health");
    let period = Utc::now().format("%Y-%m").to_string();

    // Distressed: tiny balance, heavy recurring expenses, no income.
    seed_account(&store, "h-distressed", 10.0);
    store
        .insert_recurring_item("h-distressed", FlowKind::Expense, "rent", 3_000.0, None)
        .expect("insert item");
    store
        .insert_health_record("h-distressed", &period)
        .expect("insert record");

    // Same finances, but no health record for the period.
    seed_account(&store, "h-norecord", 10.0);
    store
        .insert_recurring_item("h-norecord", FlowKind::Expense, "rent", 3_000.0, None)
        .expect("insert item");

    let mut cfg = SimConfig::default_test();
    cfg.nightly.batch_size = 1;
    let scheduler = BatchScheduler::new(store, cfg);
    let stats = completed(scheduler.run().expect("run"));

    assert_eq!(stats.users_processed, 2);
    assert_eq!(
        stats.health_scores_updated, 1,
        "only the account with a record is enriched"
    );

    let store = shared_store("sched_health");
    let record = store
        .find_health_record("h-distressed", &period)
        .expect("find")
        .expect("record exists");
    assert!(
        !record.risk_factors.is_empty(),
        "distressed finances must derive risk factors"
    );
    assert!(record
        .risk_factors
        .iter()
        .any(|f| f.kind == "cashflow" && f.impact == "critical"));
    assert!(record.risk_factors.iter().any(|f| f.kind == "liquidity"));
    let metrics = record.simulation_metrics.expect("metrics block written");
    assert!(metrics.exhaustion_probability > 75.0);
    assert!(metrics.runway_p10 >= 1.0);

    assert!(
        store
            .find_health_record("h-norecord", &period)
            .expect("find")
            .is_none(),
        "enrichment must never create a record"
    );
}

/// Manual trigger runs one account's pipeline without a full pass.
#[test]
fn manual_trigger_processes_single_account() {
    let store = shared_store("sched_manual");
    seed_account(&store, "man-1", 5_000.0);
    seed_account(&store, "man-2", 5_000.0);

    let scenario = Scenario::new("man-1", "what-if", ScenarioAdjustments::default());
    {
        let mut s = scenario.clone();
        s.config.iterations = 50;
        s.config.horizon_days = 30;
        store.insert_scenario(&s).expect("insert scenario");
    }

    let mut cfg = SimConfig::default_test();
    cfg.nightly.batch_size = 1;
    let scheduler = BatchScheduler::new(store, cfg);
    let stats = completed(
        scheduler
            .trigger_manual(Some("man-1"))
            .expect("manual trigger"),
    );
    assert_eq!(stats.users_processed, 1);
    assert_eq!(stats.scenarios_processed, 1);
    assert!(stats.errors.is_empty(), "errors: {:?}", stats.errors);

    // Without an account the trigger delegates to a full pass.
    let full = completed(scheduler.trigger_manual(None).expect("full pass"));
    assert_eq!(full.users_processed, 2);
}

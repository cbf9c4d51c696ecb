//! runway-runner: headless driver for the cash-runway engine.
//!
//! Usage:
//!   runway-runner --db runway.db --seed-demo
//!   runway-runner --db runway.db --account demo --iterations 10000 --horizon 365
//!   runway-runner --db runway.db --account demo --scenario <id>
//!   runway-runner --db runway.db --account demo --quick
//!   runway-runner --db runway.db --account demo --stress
//!   runway-runner --db runway.db --account demo --alerts
//!   runway-runner --db runway.db --nightly

use anyhow::Result;
use chrono::{Duration, Utc};
use runway_core::{
    alerts::{AlertEvaluator, CircuitBreakerOptions},
    config::SimConfig,
    orchestrator::{SimulationOptions, SimulationOrchestrator, SimulationResult},
    rng::TrialRng,
    scenario::{Scenario, ScenarioAdjustments},
    scheduler::{BatchScheduler, RunOutcome},
    store::{FlowKind, RunwayStore},
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = SimConfig::default();
    let iterations = parse_arg(&args, "--iterations", config.default_iterations);
    let horizon = parse_arg(&args, "--horizon", config.default_horizon_days);
    let seed = args
        .windows(2)
        .find(|w| w[0] == "--seed")
        .and_then(|w| w[1].parse::<u64>().ok());
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let account = args
        .windows(2)
        .find(|w| w[0] == "--account")
        .map(|w| w[1].to_string());
    let scenario_id = args
        .windows(2)
        .find(|w| w[0] == "--scenario")
        .map(|w| w[1].to_string());

    // For :memory: use a shared-memory URI so every connection the
    // scheduler reopens sees the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:runway_{}?mode=memory&cache=shared", unix_now())
    } else {
        db.to_string()
    };
    log::info!("opening store at {db_effective}");
    let store = RunwayStore::open(&db_effective)?;
    store.migrate()?;

    if args.iter().any(|a| a == "--seed-demo") {
        let demo = seed_demo(&store, seed.unwrap_or(42))?;
        println!("seeded demo account '{}' with scenario '{}'", demo.0, demo.1);
        if account.is_none() && !args.iter().any(|a| a == "--nightly") {
            return Ok(());
        }
    }

    if args.iter().any(|a| a == "--nightly") {
        let scheduler = BatchScheduler::new(store, config);
        match scheduler.run()? {
            RunOutcome::Skipped => println!("nightly run skipped: already active"),
            RunOutcome::Completed(stats) => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
        return Ok(());
    }

    let Some(account) = account else {
        anyhow::bail!("--account is required (or use --seed-demo / --nightly)");
    };
    let orchestrator = SimulationOrchestrator::new(store, config);

    if args.iter().any(|a| a == "--alerts") {
        let evaluator = AlertEvaluator::new(orchestrator);
        let record = evaluator.check_runway_alerts(&account);
        println!("{}", serde_json::to_string_pretty(&record)?);
        let decision = evaluator.circuit_breaker(&account, &CircuitBreakerOptions::default());
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }

    if args.iter().any(|a| a == "--stress") {
        let outcomes = orchestrator.run_stress_test(&account)?;
        println!("=== STRESS TEST: {account} ===");
        for outcome in &outcomes {
            let runway = &outcome.summary.runway;
            println!(
                "  {:<16} | runway P10 {:>6.1}d  P50 {:>6.1}d | exhaustion {:>6.2}%",
                outcome.label,
                runway.pessimistic,
                runway.likely,
                outcome.summary.risk.exhaustion_probability
            );
        }
        return Ok(());
    }

    let result = if args.iter().any(|a| a == "--quick") {
        orchestrator.quick_simulation(&account, None)?
    } else {
        let options = SimulationOptions {
            iterations,
            horizon_days: horizon,
            seed,
        };
        orchestrator.run_simulation(&account, scenario_id.as_deref(), &options)?
    };
    print_summary(&account, &result);
    Ok(())
}

/// Seed a demo account: 90 days of noisy ledger history, recurring
/// items, and one adverse scenario. Returns (account_id, scenario_id).
fn seed_demo(store: &RunwayStore, seed: u64) -> Result<(String, String)> {
    let account_id = "demo".to_string();
    let today = Utc::now().date_naive();
    store.insert_account(&account_id, 2_500.0, today - Duration::days(120), today)?;

    let mut rng = TrialRng::for_trial(seed, 0);
    for back in 1..=90 {
        let day = today - Duration::days(back);
        let income = rng.normal(80.0, 12.0).max(0.0);
        let expense = rng.normal(95.0, 20.0).max(0.0);
        store.upsert_daily_total(&account_id, FlowKind::Income, day, income)?;
        store.upsert_daily_total(&account_id, FlowKind::Expense, day, expense)?;
    }

    store.insert_recurring_item(&account_id, FlowKind::Income, "salary", 2_400.0, None)?;
    store.insert_recurring_item(&account_id, FlowKind::Expense, "rent", 1_500.0, None)?;
    store.insert_recurring_item(
        &account_id,
        FlowKind::Expense,
        "weekly shop",
        80.0,
        Some(346.0),
    )?;

    let scenario = Scenario::new(
        &account_id,
        "income down 30%",
        ScenarioAdjustments {
            income_change_pct: Some(-30.0),
            expense_change_pct: None,
            one_time_impacts: vec![],
        },
    );
    store.insert_scenario(&scenario)?;
    Ok((account_id, scenario.scenario_id))
}

fn print_summary(account: &str, result: &SimulationResult) {
    let meta = &result.metadata;
    let runway = &result.summary.runway;
    let end = &result.summary.end_balance;
    let risk = &result.summary.risk;

    println!("=== SIMULATION SUMMARY ===");
    println!("  account:      {account}");
    if let Some(id) = &meta.scenario_id {
        println!("  scenario:     {id}");
    }
    println!("  iterations:   {}", meta.iterations);
    println!("  horizon:      {} days", meta.horizon_days);
    println!("  seed:         {}", meta.seed);
    println!("  start balance: {:.2}", meta.starting_balance);
    println!();
    println!(
        "  burn rate:    {:.2}/day  {:.2}/week  {:.2}/month",
        result.summary.burn_rate.daily,
        result.summary.burn_rate.weekly,
        result.summary.burn_rate.monthly
    );
    println!(
        "  runway days:  P10 {:.1} | P50 {:.1} | P90 {:.1}  (mean {:.1} ± {:.1})",
        runway.pessimistic, runway.likely, runway.optimistic, runway.mean, runway.uncertainty
    );
    println!(
        "  end balance:  P10 {:.2} | P50 {:.2} | P90 {:.2}",
        end.pessimistic, end.likely, end.optimistic
    );
    println!(
        "  risk:         exhaustion {:.2}% | VaR95 {:.2} | CVaR95 {:.2}",
        risk.exhaustion_probability, risk.value_at_risk, risk.expected_shortfall
    );
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

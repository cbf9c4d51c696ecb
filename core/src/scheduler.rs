//! Nightly batch orchestration over all eligible accounts.
//!
//! RULES:
//!   - At most one run per scheduler instance. A second concurrent
//!     `run()` returns Skipped immediately, never blocks or queues.
//!   - The running flag is cleared on every exit path, including a
//!     fatal error escaping the loop, via a drop guard.
//!   - Accounts are processed in fixed-size sequential batches; each
//!     batch member runs on its own worker thread with its own store
//!     connection. Concurrency is therefore bounded by batch size.
//!   - Failures are isolated per account and per scenario: one failure
//!     is captured into RunStats.errors and never cancels siblings.
//!   - Health-score enrichment is best-effort: logged, never fatal.

use crate::{
    config::SimConfig,
    error::RunwayResult,
    orchestrator::{SimulationOptions, SimulationOrchestrator, SimulationResult},
    store::{RiskFactor, RunwayStore, SimulationMetrics},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Per-execution statistics. Created per run, never mutated after
/// completion; the scheduler retains only the latest.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub users_processed: usize,
    pub scenarios_processed: usize,
    pub health_scores_updated: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub enum RunOutcome {
    Completed(RunStats),
    /// Another run was already active; nothing was done.
    Skipped,
}

impl RunOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

#[derive(Default)]
struct AccountOutcome {
    scenarios_processed: usize,
    health_updated: bool,
    errors: Vec<String>,
}

pub struct BatchScheduler {
    // Workers never touch this connection; they reopen their own.
    // The mutex exists so the scheduler itself can be shared across
    // threads (the skip-if-running contract only matters then).
    store: Mutex<RunwayStore>,
    config: SimConfig,
    is_running: AtomicBool,
    last_run_stats: Mutex<Option<RunStats>>,
}

/// Clears the running flag on drop, whatever the exit path.
struct RunFlagGuard<'a>(&'a AtomicBool);

impl Drop for RunFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BatchScheduler {
    pub fn new(store: RunwayStore, config: SimConfig) -> Self {
        Self {
            store: Mutex::new(store),
            config,
            is_running: AtomicBool::new(false),
            last_run_stats: Mutex::new(None),
        }
    }

    fn store_guard(&self) -> RunwayResult<MutexGuard<'_, RunwayStore>> {
        self.store
            .lock()
            .map_err(|_| anyhow::anyhow!("scheduler store lock poisoned").into())
    }

    pub fn last_run_stats(&self) -> Option<RunStats> {
        self.last_run_stats
            .lock()
            .ok()
            .and_then(|stats| stats.clone())
    }

    /// True while a pass is active on this instance.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Execute one nightly pass. Returns Skipped when a pass is
    /// already active on this instance.
    pub fn run(&self) -> RunwayResult<RunOutcome> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("nightly run already active, skipping");
            return Ok(RunOutcome::Skipped);
        }
        let _guard = RunFlagGuard(&self.is_running);

        let started = std::time::Instant::now();
        let mut stats = RunStats {
            started_at: Utc::now(),
            users_processed: 0,
            scenarios_processed: 0,
            health_scores_updated: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };

        let outcome = self.execute(&mut stats);
        stats.duration_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = &outcome {
            stats.errors.push(format!("fatal: {e}"));
        }
        log::info!(
            "nightly run finished: {} users, {} scenarios, {} health updates, {} errors, {} ms",
            stats.users_processed,
            stats.scenarios_processed,
            stats.health_scores_updated,
            stats.errors.len(),
            stats.duration_ms
        );
        if let Ok(mut slot) = self.last_run_stats.lock() {
            *slot = Some(stats.clone());
        }

        outcome?;
        Ok(RunOutcome::Completed(stats))
    }

    fn execute(&self, stats: &mut RunStats) -> RunwayResult<()> {
        let nightly = &self.config.nightly;
        let accounts = self.eligible_accounts()?;
        log::info!(
            "nightly run over {} accounts in batches of {}",
            accounts.len(),
            nightly.batch_size
        );

        let batches: Vec<&[String]> = accounts.chunks(nightly.batch_size.max(1)).collect();
        let batch_count = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            let outcomes = self.process_batch(batch);
            for outcome in outcomes {
                stats.users_processed += 1;
                stats.scenarios_processed += outcome.scenarios_processed;
                if outcome.health_updated {
                    stats.health_scores_updated += 1;
                }
                stats.errors.extend(outcome.errors);
            }

            // Pace successive batches to bound resource pressure.
            if index + 1 < batch_count && nightly.inter_batch_delay_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(
                    nightly.inter_batch_delay_ms,
                ));
            }
        }
        Ok(())
    }

    /// Accounts active within the last 30 days, capped. When that
    /// query cannot be served, fall back to an unfiltered list under a
    /// more conservative cap. A failure of the fallback itself is
    /// fatal to the run: it means the store is unusable, and a pass
    /// that silently processes zero accounts would mask that.
    fn eligible_accounts(&self) -> RunwayResult<Vec<String>> {
        let nightly = &self.config.nightly;
        let since = Utc::now().date_naive() - Duration::days(nightly.active_within_days);
        let store = self.store_guard()?;
        match store.accounts_active_since(since, nightly.account_cap) {
            Ok(accounts) => Ok(accounts),
            Err(e) => {
                log::warn!("eligibility query failed ({e}), falling back to unfiltered list");
                store.all_accounts(nightly.fallback_account_cap)
            }
        }
    }

    /// One batch, one worker thread per account, each with its own
    /// store connection.
    fn process_batch(&self, batch: &[String]) -> Vec<AccountOutcome> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|account_id| {
                    scope.spawn(move || self.process_account_isolated(account_id))
                })
                .collect();
            handles
                .into_iter()
                .zip(batch)
                .map(|(handle, account_id)| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(_) => AccountOutcome {
                        errors: vec![format!("account {account_id}: worker panicked")],
                        ..Default::default()
                    },
                })
                .collect()
        })
    }

    /// The per-account pipeline with every error captured; nothing
    /// escapes to abort siblings.
    fn process_account_isolated(&self, account_id: &str) -> AccountOutcome {
        let mut outcome = AccountOutcome::default();

        let orchestrator = match self
            .store_guard()
            .and_then(|store| store.reopen())
            .map(|store| SimulationOrchestrator::new(store, self.config.clone()))
        {
            Ok(orch) => orch,
            Err(e) => {
                outcome
                    .errors
                    .push(format!("account {account_id}: store connection failed: {e}"));
                return outcome;
            }
        };

        self.process_account(&orchestrator, account_id, &mut outcome);
        outcome
    }

    fn process_account(
        &self,
        orchestrator: &SimulationOrchestrator,
        account_id: &str,
        outcome: &mut AccountOutcome,
    ) {
        let nightly = &self.config.nightly;
        let options = SimulationOptions {
            iterations: nightly.iterations,
            horizon_days: nightly.horizon_days,
            seed: None,
        };

        // Unscenario'd baseline run at full nightly iteration count.
        let base_result = match orchestrator.run_simulation(account_id, None, &options) {
            Ok(result) => Some(result),
            Err(e) => {
                outcome
                    .errors
                    .push(format!("account {account_id}: base simulation failed: {e}"));
                None
            }
        };

        // Every user-defined scenario, each isolated from the base run
        // and from its siblings.
        match orchestrator.store().scenarios_for_account(account_id) {
            Ok(scenarios) => {
                for scenario in scenarios {
                    let scenario_options = SimulationOptions {
                        iterations: scenario.config.iterations.min(nightly.iterations),
                        horizon_days: scenario.config.horizon_days,
                        seed: None,
                    };
                    match orchestrator.run_simulation(
                        account_id,
                        Some(&scenario.scenario_id),
                        &scenario_options,
                    ) {
                        Ok(_) => outcome.scenarios_processed += 1,
                        Err(e) => outcome.errors.push(format!(
                            "account {account_id} scenario {}: {e}",
                            scenario.scenario_id
                        )),
                    }
                }
            }
            Err(e) => outcome
                .errors
                .push(format!("account {account_id}: scenario listing failed: {e}")),
        }

        // Best-effort health enrichment. Logged, never fatal.
        if let Some(result) = &base_result {
            match self.enrich_health_record(orchestrator.store(), account_id, result) {
                Ok(updated) => outcome.health_updated = updated,
                Err(e) => {
                    log::warn!("account {account_id}: health enrichment failed: {e}");
                }
            }
        }
    }

    /// Derive risk factors from the base run and append them to the
    /// pre-existing health record for the current period. Skipped (not
    /// created) when no record exists.
    fn enrich_health_record(
        &self,
        store: &RunwayStore,
        account_id: &str,
        result: &SimulationResult,
    ) -> RunwayResult<bool> {
        let period = Utc::now().format("%Y-%m").to_string();
        if store.find_health_record(account_id, &period)?.is_none() {
            log::debug!("account {account_id}: no health record for {period}, skipping");
            return Ok(false);
        }

        let factors = derive_risk_factors(result);
        if !factors.is_empty() {
            store.append_risk_factors(account_id, &period, &factors)?;
        }

        let ci = &result.confidence_intervals;
        store.set_simulation_metrics(
            account_id,
            &period,
            &SimulationMetrics {
                runway_p10: ci.runway_days.p10,
                runway_p50: ci.runway_days.p50,
                runway_p90: ci.runway_days.p90,
                exhaustion_probability: ci.exhaustion_probability,
                value_at_risk: result.summary.risk.value_at_risk,
                expected_shortfall: result.summary.risk.expected_shortfall,
                last_simulated_at: result.metadata.generated_at,
            },
        )?;
        Ok(true)
    }

    /// Operator-triggered recomputation: one account's pipeline, or a
    /// full pass when no account is given.
    pub fn trigger_manual(&self, account_id: Option<&str>) -> RunwayResult<RunOutcome> {
        let Some(account_id) = account_id else {
            return self.run();
        };

        let started = std::time::Instant::now();
        let mut stats = RunStats {
            started_at: Utc::now(),
            users_processed: 1,
            scenarios_processed: 0,
            health_scores_updated: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };
        let outcome = self.process_account_isolated(account_id);
        stats.scenarios_processed = outcome.scenarios_processed;
        stats.health_scores_updated = usize::from(outcome.health_updated);
        stats.errors = outcome.errors;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(RunOutcome::Completed(stats))
    }
}

/// Threshold-derived risk factors from a nightly base run.
fn derive_risk_factors(result: &SimulationResult) -> Vec<RiskFactor> {
    let now = Utc::now();
    let ci = &result.confidence_intervals;
    let mut factors = Vec::new();

    let exhaustion = ci.exhaustion_probability;
    if exhaustion > 50.0 {
        let impact = if exhaustion > 75.0 { "critical" } else { "high" };
        factors.push(RiskFactor {
            kind: "cashflow".into(),
            impact: impact.into(),
            detail: format!("fund exhaustion probability at {exhaustion:.2}%"),
            recorded_at: now,
        });
    }

    let p10_runway = ci.runway_days.p10;
    if p10_runway < 30.0 {
        let impact = if p10_runway < 14.0 { "critical" } else { "high" };
        factors.push(RiskFactor {
            kind: "liquidity".into(),
            impact: impact.into(),
            detail: format!("pessimistic runway at {p10_runway:.0} days"),
            recorded_at: now,
        });
    }

    let shortfall = result.summary.risk.expected_shortfall;
    let balance = result.metadata.starting_balance;
    if shortfall.abs() > balance.abs() / 2.0 {
        factors.push(RiskFactor {
            kind: "volatility".into(),
            impact: "high".into(),
            detail: format!(
                "expected shortfall {shortfall:.2} exceeds half of balance {balance:.2}"
            ),
            recorded_at: now,
        });
    }

    factors
}

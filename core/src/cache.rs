//! Short-TTL, bounded-size cache of recent simulation outputs.
//!
//! RULES:
//!   - Entries lazily expire on read; there is no background sweep.
//!   - Eviction on overflow removes the oldest-INSERTED entry, a
//!     simple capacity bound. Deliberately not LRU (see DESIGN.md).
//!   - Process-local only; no cross-process coherency.

use crate::orchestrator::{SimulationOptions, SimulationResult};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Tagged cache slot: timestamp plus payload, never a bare value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub inserted_at: Instant,
    pub payload: SimulationResult,
}

pub struct ResultCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

/// Deterministic key over everything that parameterizes a run.
pub fn cache_key(account_id: &str, scenario_id: Option<&str>, options: &SimulationOptions) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        account_id,
        scenario_id.unwrap_or("default"),
        options.iterations,
        options.horizon_days,
        options
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
    )
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Returns the payload, or None when absent or expired. Expired
    /// entries are dropped on the spot.
    pub fn get(&mut self, key: &str) -> Option<SimulationResult> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            self.insertion_order.retain(|k| k != key);
            return None;
        }
        self.entries.get(key).map(|e| e.payload.clone())
    }

    /// Insert, evicting the oldest-inserted entry first when full.
    pub fn set(&mut self, key: String, payload: SimulationResult) {
        if self.entries.contains_key(&key) {
            self.insertion_order.retain(|k| k != &key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                inserted_at: Instant::now(),
                payload,
            },
        );
        self.insertion_order.push_back(key);
    }

    /// Drop every entry belonging to an account. Called on
    /// financial-state mutation.
    pub fn invalidate_account(&mut self, account_id: &str) {
        let prefix = format!("{account_id}|");
        self.entries.retain(|k, _| !k.starts_with(&prefix));
        self.insertion_order.retain(|k| !k.starts_with(&prefix));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::orchestrator::SimulationOptions;

    fn dummy_result(tag: u32) -> SimulationResult {
        // A tiny real run keeps the fixture honest without hand-building
        // every nested stats struct.
        let cfg = SimConfig::default_test();
        let orch = crate::orchestrator::SimulationOrchestrator::standalone(cfg).unwrap();
        let baseline = crate::baseline::BaselineProfile {
            current_balance: 1_000.0 + f64::from(tag),
            daily_income_mean: 40.0,
            daily_income_std_dev: 4.0,
            daily_expense_mean: 50.0,
            daily_expense_std_dev: 5.0,
            one_time_impacts: vec![],
        };
        orch.run_with_baseline(
            &baseline,
            None,
            &SimulationOptions {
                iterations: 10,
                horizon_days: 10,
                seed: Some(u64::from(tag)),
            },
        )
        .unwrap()
    }

    #[test]
    fn expired_entry_is_a_miss_not_an_error() {
        let mut cache = ResultCache::new(Duration::from_millis(20), 10);
        cache.set("k".into(), dummy_result(1));
        assert!(cache.get("k").is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty(), "expired entry should be dropped on read");
    }

    #[test]
    fn overflow_evicts_oldest_inserted() {
        let mut cache = ResultCache::new(Duration::from_secs(60), 2);
        cache.set("a".into(), dummy_result(1));
        cache.set("b".into(), dummy_result(2));
        // Touching "a" must NOT save it: eviction is insertion-order.
        assert!(cache.get("a").is_some());
        cache.set("c".into(), dummy_result(3));
        assert!(cache.get("a").is_none(), "oldest-inserted must be evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn invalidate_account_only_drops_that_prefix() {
        let mut cache = ResultCache::new(Duration::from_secs(60), 10);
        let opts = SimulationOptions {
            iterations: 10,
            horizon_days: 10,
            seed: Some(1),
        };
        let k1 = cache_key("acct-1", None, &opts);
        let k2 = cache_key("acct-2", Some("s"), &opts);
        cache.set(k1.clone(), dummy_result(1));
        cache.set(k2.clone(), dummy_result(2));
        cache.invalidate_account("acct-1");
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
    }
}

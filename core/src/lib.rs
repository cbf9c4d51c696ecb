//! Cash-runway Monte Carlo engine.
//!
//! Simulates day-by-day account balance paths under income/expense
//! uncertainty, aggregates them into percentile bands and risk
//! metrics, and layers scenario what-ifs, nightly batch recomputation,
//! result caching, and threshold alerting on top.
//!
//! Module map:
//!   - `path` / `rng` / `stats`: the Monte Carlo core.
//!   - `orchestrator`: baseline gathering, scenario application,
//!     trial fan-out, summary generation.
//!   - `scheduler`: nightly batch pass over eligible accounts.
//!   - `alerts`: severity evaluation and the circuit-breaker gate.
//!   - `cache`: short-TTL bounded result cache.
//!   - `store`: the single SQL gatekeeper.

pub mod alerts;
pub mod baseline;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod path;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod types;

pub use error::{RunwayError, RunwayResult};

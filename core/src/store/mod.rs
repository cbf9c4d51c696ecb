//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! The orchestrator, scheduler, and alert evaluator call store
//! methods and never execute SQL directly.

use crate::error::RunwayResult;
use rusqlite::Connection;

mod health;
mod ledger;
mod recurring;
mod scenario;

pub use health::{HealthRecord, RiskFactor, SimulationMetrics, MAX_RISK_FACTORS};
pub use ledger::{DailyAggregate, FlowKind};
pub use recurring::RecurringItem;

pub struct RunwayStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file/URI
}

impl RunwayStore {
    pub fn open(path: &str) -> RunwayResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RunwayResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database. Batch workers use
    /// this to get a connection per thread.
    ///
    /// A plain in-memory database has no second way in: a reopen would
    /// hand back an empty, unrelated database. Refuse it; shared access
    /// needs a file path or a `file:name?mode=memory&cache=shared` URI
    /// via `open()`.
    pub fn reopen(&self) -> RunwayResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Err(anyhow::anyhow!(
                "cannot reopen a private in-memory database; \
                 open a file path or a shared-cache memory URI instead"
            )
            .into()),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RunwayResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

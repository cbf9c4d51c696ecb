//! Account registry and daily ledger aggregates.

use super::RunwayStore;
use crate::error::RunwayResult;
use chrono::NaiveDate;
use rusqlite::params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Income,
    Expense,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub daily_total: f64,
}

impl RunwayStore {
    // ── Account ───────────────────────────────────────────────────

    pub fn insert_account(
        &self,
        account_id: &str,
        balance: f64,
        created_at: NaiveDate,
        last_active_at: NaiveDate,
    ) -> RunwayResult<()> {
        self.conn().execute(
            "INSERT INTO account (account_id, balance, created_at, last_active_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                account_id,
                balance,
                created_at.to_string(),
                last_active_at.to_string()
            ],
        )?;
        Ok(())
    }

    pub fn account_balance(&self, account_id: &str) -> RunwayResult<f64> {
        let balance = self.conn().query_row(
            "SELECT balance FROM account WHERE account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    pub fn set_account_balance(&self, account_id: &str, balance: f64) -> RunwayResult<()> {
        self.conn().execute(
            "UPDATE account SET balance = ?2 WHERE account_id = ?1",
            params![account_id, balance],
        )?;
        Ok(())
    }

    pub fn touch_account(&self, account_id: &str, active_at: NaiveDate) -> RunwayResult<()> {
        self.conn().execute(
            "UPDATE account SET last_active_at = ?2 WHERE account_id = ?1",
            params![account_id, active_at.to_string()],
        )?;
        Ok(())
    }

    /// Accounts active on or after `since`, newest first, capped.
    pub fn accounts_active_since(
        &self,
        since: NaiveDate,
        cap: usize,
    ) -> RunwayResult<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT account_id FROM account
             WHERE last_active_at >= ?1
             ORDER BY last_active_at DESC, account_id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![since.to_string(), cap as i64], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Unfiltered account list, capped. The conservative fallback when
    /// the eligibility query cannot be served.
    pub fn all_accounts(&self, cap: usize) -> RunwayResult<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT account_id FROM account ORDER BY account_id ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![cap as i64], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Daily aggregates ──────────────────────────────────────────

    pub fn upsert_daily_total(
        &self,
        account_id: &str,
        flow: FlowKind,
        date: NaiveDate,
        daily_total: f64,
    ) -> RunwayResult<()> {
        self.conn().execute(
            "INSERT INTO ledger_daily (account_id, flow, date, daily_total)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id, flow, date) DO UPDATE SET daily_total = excluded.daily_total",
            params![account_id, flow.as_str(), date.to_string(), daily_total],
        )?;
        Ok(())
    }

    /// Daily totals for one flow over [start, end], ascending by date.
    /// An empty result is valid; it triggers the baseline fallback.
    pub fn daily_aggregates(
        &self,
        account_id: &str,
        flow: FlowKind,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RunwayResult<Vec<DailyAggregate>> {
        let mut stmt = self.conn().prepare(
            "SELECT date, daily_total FROM ledger_daily
             WHERE account_id = ?1 AND flow = ?2 AND date BETWEEN ?3 AND ?4
             ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(
            params![
                account_id,
                flow.as_str(),
                start.to_string(),
                end.to_string()
            ],
            |row| {
                let date: String = row.get(0)?;
                Ok((date, row.get::<_, f64>(1)?))
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (date, daily_total) = row?;
            let date = date.parse::<NaiveDate>().map_err(|e| {
                anyhow::anyhow!("malformed ledger date '{date}' for {account_id}: {e}")
            })?;
            out.push(DailyAggregate { date, daily_total });
        }
        Ok(out)
    }
}

//! Recurring income/expense items.

use super::{ledger::FlowKind, RunwayStore};
use crate::error::RunwayResult;
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct RecurringItem {
    pub item_id: String,
    pub account_id: String,
    pub label: String,
    pub amount: f64,
    monthly_estimate: Option<f64>,
}

impl RecurringItem {
    /// Monthly-estimate capability: items without one fall back to
    /// their raw stored amount.
    pub fn monthly_estimate(&self) -> f64 {
        self.monthly_estimate.unwrap_or(self.amount)
    }
}

impl RunwayStore {
    pub fn insert_recurring_item(
        &self,
        account_id: &str,
        flow: FlowKind,
        label: &str,
        amount: f64,
        monthly_estimate: Option<f64>,
    ) -> RunwayResult<String> {
        let item_id = uuid::Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO recurring_item (item_id, account_id, flow, label, amount, monthly_estimate, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![item_id, account_id, flow.as_str(), label, amount, monthly_estimate],
        )?;
        Ok(item_id)
    }

    pub fn active_items(
        &self,
        account_id: &str,
        flow: FlowKind,
    ) -> RunwayResult<Vec<RecurringItem>> {
        let mut stmt = self.conn().prepare(
            "SELECT item_id, account_id, label, amount, monthly_estimate
             FROM recurring_item
             WHERE account_id = ?1 AND flow = ?2 AND active = 1
             ORDER BY item_id ASC",
        )?;
        let rows = stmt.query_map(params![account_id, flow.as_str()], |row| {
            Ok(RecurringItem {
                item_id: row.get(0)?,
                account_id: row.get(1)?,
                label: row.get(2)?,
                amount: row.get(3)?,
                monthly_estimate: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn deactivate_item(&self, item_id: &str) -> RunwayResult<()> {
        self.conn().execute(
            "UPDATE recurring_item SET active = 0 WHERE item_id = ?1",
            params![item_id],
        )?;
        Ok(())
    }
}

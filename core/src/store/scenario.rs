//! Scenario CRUD, staleness queries, and batch snapshot upserts.

use super::RunwayStore;
use crate::{
    error::{RunwayError, RunwayResult},
    scenario::{ResultSnapshot, Scenario, ScenarioAdjustments, ScenarioConfig},
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn scenario_from_row(row: &Row<'_>) -> rusqlite::Result<(Scenario, String, Option<String>)> {
    let adjustments_json: String = row.get(3)?;
    let snapshot_json: Option<String> = row.get(7)?;
    let scenario = Scenario {
        scenario_id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        adjustments: ScenarioAdjustments::default(), // filled by caller
        config: ScenarioConfig {
            iterations: row.get::<_, i64>(4)? as u32,
            horizon_days: row.get::<_, i64>(5)? as u32,
        },
        last_run_at: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        last_snapshot: None, // filled by caller
    };
    Ok((scenario, adjustments_json, snapshot_json))
}

fn hydrate(
    (mut scenario, adjustments_json, snapshot_json): (Scenario, String, Option<String>),
) -> RunwayResult<Scenario> {
    scenario.adjustments = serde_json::from_str(&adjustments_json)?;
    scenario.last_snapshot = snapshot_json
        .map(|s| serde_json::from_str::<ResultSnapshot>(&s))
        .transpose()?;
    Ok(scenario)
}

const SCENARIO_COLUMNS: &str = "scenario_id, account_id, name, adjustments_json, \
                                iterations, horizon_days, last_run_at, snapshot_json";

impl RunwayStore {
    pub fn insert_scenario(&self, scenario: &Scenario) -> RunwayResult<()> {
        self.conn().execute(
            "INSERT INTO scenario (scenario_id, account_id, name, adjustments_json,
                                   iterations, horizon_days, last_run_at, snapshot_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scenario.scenario_id,
                scenario.account_id,
                scenario.name,
                serde_json::to_string(&scenario.adjustments)?,
                scenario.config.iterations as i64,
                scenario.config.horizon_days as i64,
                scenario.last_run_at.map(|t| t.to_rfc3339()),
                scenario
                    .last_snapshot
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        Ok(())
    }

    pub fn get_scenario(&self, scenario_id: &str) -> RunwayResult<Scenario> {
        let query = format!("SELECT {SCENARIO_COLUMNS} FROM scenario WHERE scenario_id = ?1");
        let raw = self
            .conn()
            .prepare(&query)?
            .query_row(params![scenario_id], scenario_from_row)
            .optional()?
            .ok_or_else(|| RunwayError::ScenarioNotFound {
                scenario_id: scenario_id.to_string(),
            })?;
        hydrate(raw)
    }

    pub fn scenarios_for_account(&self, account_id: &str) -> RunwayResult<Vec<Scenario>> {
        let query = format!(
            "SELECT {SCENARIO_COLUMNS} FROM scenario
             WHERE account_id = ?1 ORDER BY scenario_id ASC"
        );
        let mut stmt = self.conn().prepare(&query)?;
        let raws = stmt
            .query_map(params![account_id], scenario_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(hydrate).collect()
    }

    pub fn delete_scenario(&self, scenario_id: &str) -> RunwayResult<()> {
        self.conn().execute(
            "DELETE FROM scenario WHERE scenario_id = ?1",
            params![scenario_id],
        )?;
        Ok(())
    }

    /// Scenarios whose snapshot is older than `hours` (or missing
    /// entirely), for refresh targeting.
    pub fn stale_scenarios(&self, hours: i64, now: DateTime<Utc>) -> RunwayResult<Vec<Scenario>> {
        let cutoff = (now - Duration::hours(hours)).to_rfc3339();
        let query = format!(
            "SELECT {SCENARIO_COLUMNS} FROM scenario
             WHERE last_run_at IS NULL OR last_run_at < ?1
             ORDER BY scenario_id ASC"
        );
        let mut stmt = self.conn().prepare(&query)?;
        let raws = stmt
            .query_map(params![cutoff], scenario_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(hydrate).collect()
    }

    pub fn update_snapshot(
        &self,
        scenario_id: &str,
        ran_at: DateTime<Utc>,
        snapshot: &ResultSnapshot,
    ) -> RunwayResult<()> {
        self.conn().execute(
            "UPDATE scenario SET last_run_at = ?2, snapshot_json = ?3 WHERE scenario_id = ?1",
            params![
                scenario_id,
                ran_at.to_rfc3339(),
                serde_json::to_string(snapshot)?
            ],
        )?;
        Ok(())
    }

    /// Batch snapshot upsert after a nightly pass. One transaction.
    pub fn upsert_snapshots(
        &mut self,
        snapshots: &[(String, DateTime<Utc>, ResultSnapshot)],
    ) -> RunwayResult<()> {
        let tx = self.conn.transaction()?;
        for (scenario_id, ran_at, snapshot) in snapshots {
            tx.execute(
                "UPDATE scenario SET last_run_at = ?2, snapshot_json = ?3 WHERE scenario_id = ?1",
                params![
                    scenario_id,
                    ran_at.to_rfc3339(),
                    serde_json::to_string(snapshot)?
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

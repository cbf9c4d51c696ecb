//! Externally-owned financial-health records.
//!
//! The nightly scheduler only ENRICHES these: it appends derived risk
//! factors and writes the simulation metrics block to a record that
//! already exists for the account/period. It never creates records.

use super::RunwayStore;
use crate::error::RunwayResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Hard cap on accumulated risk factors per record.
pub const MAX_RISK_FACTORS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    /// "cashflow", "liquidity", or "volatility".
    pub kind: String,
    /// "high" or "critical".
    pub impact: String,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub runway_p10: f64,
    pub runway_p50: f64,
    pub runway_p90: f64,
    pub exhaustion_probability: f64,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
    pub last_simulated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub account_id: String,
    pub period: String,
    pub risk_factors: Vec<RiskFactor>,
    pub simulation_metrics: Option<SimulationMetrics>,
}

impl RunwayStore {
    pub fn insert_health_record(&self, account_id: &str, period: &str) -> RunwayResult<()> {
        self.conn().execute(
            "INSERT INTO health_record (account_id, period, risk_factors_json)
             VALUES (?1, ?2, '[]')",
            params![account_id, period],
        )?;
        Ok(())
    }

    /// Find-or-skip: None when no record exists for the period.
    pub fn find_health_record(
        &self,
        account_id: &str,
        period: &str,
    ) -> RunwayResult<Option<HealthRecord>> {
        let raw = self
            .conn()
            .prepare(
                "SELECT risk_factors_json, simulation_metrics_json
                 FROM health_record WHERE account_id = ?1 AND period = ?2",
            )?
            .query_row(params![account_id, period], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                ))
            })
            .optional()?;

        let Some((factors_json, metrics_json)) = raw else {
            return Ok(None);
        };
        Ok(Some(HealthRecord {
            account_id: account_id.to_string(),
            period: period.to_string(),
            risk_factors: serde_json::from_str(&factors_json)?,
            simulation_metrics: metrics_json
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
        }))
    }

    /// Append risk factors, keeping only the newest MAX_RISK_FACTORS.
    /// Returns false (and writes nothing) when no record exists.
    pub fn append_risk_factors(
        &self,
        account_id: &str,
        period: &str,
        new_factors: &[RiskFactor],
    ) -> RunwayResult<bool> {
        let Some(mut record) = self.find_health_record(account_id, period)? else {
            return Ok(false);
        };
        record.risk_factors.extend_from_slice(new_factors);
        if record.risk_factors.len() > MAX_RISK_FACTORS {
            let drop = record.risk_factors.len() - MAX_RISK_FACTORS;
            record.risk_factors.drain(..drop);
        }
        self.conn().execute(
            "UPDATE health_record SET risk_factors_json = ?3
             WHERE account_id = ?1 AND period = ?2",
            params![
                account_id,
                period,
                serde_json::to_string(&record.risk_factors)?
            ],
        )?;
        Ok(true)
    }

    /// Write the simulation metrics block. Returns false when no
    /// record exists for the period.
    pub fn set_simulation_metrics(
        &self,
        account_id: &str,
        period: &str,
        metrics: &SimulationMetrics,
    ) -> RunwayResult<bool> {
        let updated = self.conn().execute(
            "UPDATE health_record SET simulation_metrics_json = ?3
             WHERE account_id = ?1 AND period = ?2",
            params![account_id, period, serde_json::to_string(metrics)?],
        )?;
        Ok(updated > 0)
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunwayError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Baseline unavailable for account '{account_id}': {reason}")]
    BaselineUnavailable { account_id: String, reason: String },

    #[error("Scenario '{scenario_id}' not found")]
    ScenarioNotFound { scenario_id: String },

    #[error("Invalid simulation options: {reason}")]
    InvalidOptions { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RunwayResult<T> = Result<T, RunwayError>;

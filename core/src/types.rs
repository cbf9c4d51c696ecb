//! Shared primitive types used across the entire subsystem.

/// A stable, unique identifier for a user account.
pub type AccountId = String;

/// The canonical scenario identifier.
pub type ScenarioId = String;

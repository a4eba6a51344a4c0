//! Error types for formbind-sync
//!
//! Lock conflicts and missing required fields are distinct variants so the
//! calling layer can offer "reload and retry" instead of a generic failure.

use formbind_common::EntityKind;
use thiserror::Error;

/// Main error type for the synchronization engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// A conditional update matched zero rows: the stored row version is not
    /// the one the caller last observed
    #[error("Lock conflict on {entity} {entity_id}: expected row version {expected_version}")]
    LockConflict {
        entity: EntityKind,
        entity_id: String,
        expected_version: i64,
    },

    /// Technology creation attempted without the minimum required fields
    #[error("Cannot create technology {tech_id}: missing required fields {}", missing.join(", "))]
    MissingRequiredFields { tech_id: String, missing: Vec<String> },

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors from shared infrastructure
    #[error(transparent)]
    Common(#[from] formbind_common::Error),

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// True when the caller should reload current versions and resubmit
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, SyncError::LockConflict { .. })
    }
}

/// Convenience Result type using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

//! Persistence layer for guardiand
//!
//! Provides:
//! - App catalog and children roster
//! - Installation records, created atomically with their alert
//! - Alert ledger with read state
//! - Per-child policies (upsert onto defaults)
//! - Daily screen-time records
//!
//! Two backends implement [`Store`]: [`MemoryStore`] (default) and
//! [`SqliteStore`].

mod memory;
mod sqlite;
mod traits;

pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use guardian_util::GuardianError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for GuardianError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => GuardianError::NotFound(what),
            StoreError::Conflict(what) => GuardianError::Conflict(what),
            other => GuardianError::StoreError(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_kind() {
        let e: GuardianError = StoreError::Conflict("app 4 for child 1".into()).into();
        assert!(matches!(e, GuardianError::Conflict(_)));

        let e: GuardianError = StoreError::NotFound("alert 9".into()).into();
        assert!(matches!(e, GuardianError::NotFound(_)));

        let e: GuardianError = StoreError::Database("disk I/O error".into()).into();
        assert!(matches!(e, GuardianError::StoreError(_)));
    }
}

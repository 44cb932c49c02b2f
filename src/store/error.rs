//! Store errors.

use crate::store::path::DocumentPath;
use crate::store::snapshot::{Precondition, Revision};

/// Failure reported by a document store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Document does not exist.
    #[error("document not found: {0}")]
    NotFound(DocumentPath),

    /// Access rules rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(DocumentPath),

    /// Conditional write lost a race.
    #[error("precondition {expected:?} failed on {path} (now at revision {actual})")]
    PreconditionFailed {
        /// Document path
        path: DocumentPath,
        /// Condition requested
        expected: Precondition,
        /// Revision found
        actual: Revision,
    },

    /// Network or backend unavailable; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Subscriber fell behind and missed snapshots.
    #[error("subscription lagged by {0} snapshots")]
    Lagged(u64),

    /// Document body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

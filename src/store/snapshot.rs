//! Snapshots and Write Preconditions

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::store::error::StoreError;
use crate::store::path::DocumentPath;

/// Monotonic document revision. 0 means the document does not exist.
pub type Revision = u64;

/// Full state of one document as seen at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// Document path
    pub path: DocumentPath,
    /// Revision of this state (0 if absent)
    pub revision: Revision,
    /// Document body; `None` if absent or deleted
    pub data: Option<Value>,
}

impl Snapshot {
    /// Snapshot of a document that does not exist.
    pub fn absent(path: DocumentPath) -> Self {
        Self { path, revision: 0, data: None }
    }

    /// Whether the document exists.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Deserialize the body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        self.data
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(StoreError::from)
    }
}

/// Condition a write must satisfy to be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional.
    None,
    /// Document must not exist (create-if-absent).
    Absent,
    /// Document must be at exactly this revision (compare-and-set).
    Revision(Revision),
}

impl Precondition {
    /// Check against the current revision (0 if absent).
    pub fn holds(self, current: Revision) -> bool {
        match self {
            Precondition::None => true,
            Precondition::Absent => current == 0,
            Precondition::Revision(expected) => current == expected,
        }
    }
}

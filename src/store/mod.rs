//! Document Store Module
//!
//! The replicated document store the tournament is coordinated through.
//! Clients never talk to each other; they read documents, write them
//! with preconditions, and react to snapshots.
//!
//! ## Module Structure
//!
//! - `path`: Document paths and the tournament layout
//! - `snapshot`: Snapshots, revisions, write preconditions
//! - `subscription`: Snapshot streams
//! - `memory`: In-process store
//! - `retry`: Transient-failure retry wrapper

pub mod error;
pub mod path;
pub mod snapshot;
pub mod subscription;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::StoreError;
pub use path::{DocumentPath, Layout};
pub use snapshot::{Precondition, Revision, Snapshot};
pub use subscription::{Predicate, Subscription};
pub use memory::MemoryStore;
pub use retry::RetryingStore;

/// Document store with conditional writes and snapshot subscriptions.
///
/// Every successful write produces a new, strictly greater revision.
/// Deleting produces a snapshot with `data: None`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document. Absent documents yield a snapshot with
    /// revision 0 and no data.
    async fn get(&self, path: &DocumentPath) -> Result<Snapshot, StoreError>;

    /// Replace a document.
    async fn set(
        &self,
        path: &DocumentPath,
        document: Value,
        precondition: Precondition,
    ) -> Result<Revision, StoreError>;

    /// Merge top-level fields into an existing document.
    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
        precondition: Precondition,
    ) -> Result<Revision, StoreError>;

    /// Remove a document.
    async fn delete(&self, path: &DocumentPath, precondition: Precondition) -> Result<(), StoreError>;

    /// Watch one document.
    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError>;

    /// Watch the direct children of a collection that match `predicate`.
    async fn subscribe_query(
        &self,
        collection: &DocumentPath,
        predicate: Predicate,
    ) -> Result<Subscription, StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn get(&self, path: &DocumentPath) -> Result<Snapshot, StoreError> {
        (**self).get(path).await
    }

    async fn set(
        &self,
        path: &DocumentPath,
        document: Value,
        precondition: Precondition,
    ) -> Result<Revision, StoreError> {
        (**self).set(path, document, precondition).await
    }

    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
        precondition: Precondition,
    ) -> Result<Revision, StoreError> {
        (**self).update(path, fields, precondition).await
    }

    async fn delete(&self, path: &DocumentPath, precondition: Precondition) -> Result<(), StoreError> {
        (**self).delete(path, precondition).await
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError> {
        (**self).subscribe(path).await
    }

    async fn subscribe_query(
        &self,
        collection: &DocumentPath,
        predicate: Predicate,
    ) -> Result<Subscription, StoreError> {
        (**self).subscribe_query(collection, predicate).await
    }
}

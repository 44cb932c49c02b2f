//! In-Memory Document Store
//!
//! A process-local store with the same semantics as a replicated one:
//! a single revision clock, conditional writes, and a change feed. Used
//! by the demo binary and by tests, which can also inject outages and
//! access-rule denials.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

use crate::store::error::StoreError;
use crate::store::path::DocumentPath;
use crate::store::snapshot::{Precondition, Revision, Snapshot};
use crate::store::subscription::{Predicate, Subscription};
use crate::store::DocumentStore;

/// Change feed capacity per subscriber.
const CHANGE_FEED_CAPACITY: usize = 1024;

struct Document {
    revision: Revision,
    data: Value,
}

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<DocumentPath, Document>,
    clock: Revision,
}

impl StoreState {
    fn snapshot(&self, path: &DocumentPath) -> Snapshot {
        match self.documents.get(path) {
            Some(doc) => Snapshot {
                path: path.clone(),
                revision: doc.revision,
                data: Some(doc.data.clone()),
            },
            None => Snapshot::absent(path.clone()),
        }
    }
}

#[derive(Default)]
struct Faults {
    /// Calls left to fail with `Unavailable`
    fail_next: u32,
    /// Prefixes rejected with `PermissionDenied`
    denied: Vec<DocumentPath>,
}

/// Process-local document store.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    changes: broadcast::Sender<Snapshot>,
    faults: RwLock<Faults>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: RwLock::new(StoreState::default()),
            changes,
            faults: RwLock::new(Faults::default()),
        }
    }

    /// Create an empty store behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fail the next `n` calls with `Unavailable`.
    pub async fn fail_next(&self, n: u32) {
        self.faults.write().await.fail_next = n;
    }

    /// Reject every call on `prefix` or beneath it.
    pub async fn deny(&self, prefix: DocumentPath) {
        self.faults.write().await.denied.push(prefix);
    }

    /// Lift all access denials.
    pub async fn allow_all(&self) {
        self.faults.write().await.denied.clear();
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// Paths of stored documents beneath `prefix`.
    pub async fn paths_under(&self, prefix: &DocumentPath) -> Vec<DocumentPath> {
        self.state
            .read()
            .await
            .documents
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    async fn check(&self, path: &DocumentPath) -> Result<(), StoreError> {
        let mut faults = self.faults.write().await;
        if faults.denied.iter().any(|prefix| path.starts_with(prefix)) {
            return Err(StoreError::PermissionDenied(path.clone()));
        }
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }

    /// Apply a conditional write. `write` maps the current body to the
    /// next one; `None` deletes.
    async fn commit<F>(&self, path: &DocumentPath, precondition: Precondition, write: F) -> Result<Revision, StoreError>
    where
        F: FnOnce(Option<&Value>) -> Result<Option<Value>, StoreError>,
    {
        self.check(path).await?;

        let mut state = self.state.write().await;
        let current = state.documents.get(path);
        let current_revision = current.map(|d| d.revision).unwrap_or(0);
        if !precondition.holds(current_revision) {
            debug!("precondition {:?} failed on {} at revision {}", precondition, path, current_revision);
            return Err(StoreError::PreconditionFailed {
                path: path.clone(),
                expected: precondition,
                actual: current_revision,
            });
        }

        let next = write(current.map(|d| &d.data))?;
        if current.is_none() && next.is_none() {
            return Ok(0);
        }

        state.clock += 1;
        let revision = state.clock;
        match &next {
            Some(data) => {
                state.documents.insert(path.clone(), Document { revision, data: data.clone() });
            }
            None => {
                state.documents.remove(path);
            }
        }
        trace!("{} -> revision {}", path, revision);

        // Sent under the write lock so the feed is in revision order
        let _ = self.changes.send(Snapshot {
            path: path.clone(),
            revision,
            data: next,
        });
        Ok(revision)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Snapshot, StoreError> {
        self.check(path).await?;
        Ok(self.state.read().await.snapshot(path))
    }

    async fn set(
        &self,
        path: &DocumentPath,
        document: Value,
        precondition: Precondition,
    ) -> Result<Revision, StoreError> {
        self.commit(path, precondition, |_| Ok(Some(document))).await
    }

    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
        precondition: Precondition,
    ) -> Result<Revision, StoreError> {
        self.commit(path, precondition, |current| {
            let mut merged = match current {
                Some(Value::Object(existing)) => existing.clone(),
                Some(_) => return Err(StoreError::Serialization(format!("{} is not an object", path))),
                None => return Err(StoreError::NotFound(path.clone())),
            };
            merged.extend(fields);
            Ok(Some(Value::Object(merged)))
        })
        .await
    }

    async fn delete(&self, path: &DocumentPath, precondition: Precondition) -> Result<(), StoreError> {
        self.commit(path, precondition, |_| Ok(None)).await.map(|_| ())
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError> {
        self.check(path).await?;

        let state = self.state.read().await;
        let receiver = self.changes.subscribe();
        let initial = vec![state.snapshot(path)];
        let watched = path.clone();
        Ok(Subscription::new(
            initial,
            receiver,
            Arc::new(move |s: &Snapshot| s.path == watched),
        ))
    }

    async fn subscribe_query(
        &self,
        collection: &DocumentPath,
        predicate: Predicate,
    ) -> Result<Subscription, StoreError> {
        self.check(collection).await?;

        let in_collection = {
            let collection = collection.clone();
            move |s: &Snapshot| s.path.parent().as_ref() == Some(&collection)
        };

        let state = self.state.read().await;
        let receiver = self.changes.subscribe();
        let initial: Vec<Snapshot> = state
            .documents
            .keys()
            .filter(|p| p.parent().as_ref() == Some(collection))
            .map(|p| state.snapshot(p))
            .filter(|s| predicate(s))
            .collect();

        // Deletions are always delivered
        let filter: Predicate = Arc::new(move |s: &Snapshot| in_collection(s) && (!s.exists() || predicate(s)));
        Ok(Subscription::new(initial, receiver, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> DocumentPath {
        DocumentPath::new(p)
    }

    #[tokio::test]
    async fn test_set_get_and_revisions() {
        let store = MemoryStore::new();
        let p = path("t/ABCD");

        assert!(!store.get(&p).await.unwrap().exists());

        let r1 = store.set(&p, json!({"a": 1}), Precondition::Absent).await.unwrap();
        let r2 = store.set(&p, json!({"a": 2}), Precondition::Revision(r1)).await.unwrap();
        assert!(r2 > r1);

        let snap = store.get(&p).await.unwrap();
        assert_eq!(snap.revision, r2);
        assert_eq!(snap.data, Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn test_conditional_writes_reject_stale() {
        let store = MemoryStore::new();
        let p = path("t/ABCD");
        let r1 = store.set(&p, json!({}), Precondition::None).await.unwrap();

        let err = store.set(&p, json!({}), Precondition::Absent).await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { actual, .. } if actual == r1));

        store.set(&p, json!({"x": 1}), Precondition::Revision(r1)).await.unwrap();
        let err = store.set(&p, json!({"x": 2}), Precondition::Revision(r1)).await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        let p = path("t/ABCD");

        let mut fields = Map::new();
        fields.insert("b".into(), json!(2));
        assert!(matches!(
            store.update(&p, fields.clone(), Precondition::None).await,
            Err(StoreError::NotFound(_))
        ));

        store.set(&p, json!({"a": 1, "b": 1}), Precondition::None).await.unwrap();
        store.update(&p, fields, Precondition::None).await.unwrap();
        assert_eq!(store.get(&p).await.unwrap().data, Some(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn test_subscribe_sees_current_then_changes() {
        let store = MemoryStore::new();
        let p = path("t/ABCD");
        store.set(&p, json!({"v": 1}), Precondition::None).await.unwrap();

        let mut sub = store.subscribe(&p).await.unwrap();
        store.set(&path("t/OTHER"), json!({}), Precondition::None).await.unwrap();
        store.set(&p, json!({"v": 2}), Precondition::None).await.unwrap();
        store.delete(&p, Precondition::None).await.unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap().data, Some(json!({"v": 1})));
        assert_eq!(sub.next().await.unwrap().unwrap().data, Some(json!({"v": 2})));
        let gone = sub.next().await.unwrap().unwrap();
        assert!(!gone.exists());
        assert!(gone.revision > 0);
    }

    #[tokio::test]
    async fn test_query_watches_direct_children() {
        let store = MemoryStore::new();
        let matches = path("t/ABCD/matches");
        store.set(&matches.child("m1"), json!({"round": 1}), Precondition::None).await.unwrap();
        store.set(&matches.child("m2"), json!({"round": 2}), Precondition::None).await.unwrap();

        let round_two: Predicate = Arc::new(|s: &Snapshot| {
            s.data.as_ref().and_then(|d| d.get("round")).and_then(Value::as_u64) == Some(2)
        });
        let mut sub = store.subscribe_query(&matches, round_two).await.unwrap();

        store.set(&path("t/ABCD"), json!({}), Precondition::None).await.unwrap();
        store.set(&matches.child("m3"), json!({"round": 2}), Precondition::None).await.unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap().path.leaf(), "m2");
        assert_eq!(sub.next().await.unwrap().unwrap().path.leaf(), "m3");
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new();
        let p = path("t/ABCD");

        store.fail_next(1).await;
        assert!(matches!(store.get(&p).await, Err(StoreError::Unavailable(_))));
        assert!(store.get(&p).await.is_ok());

        store.deny(path("t")).await;
        assert!(matches!(store.subscribe(&p).await, Err(StoreError::PermissionDenied(_))));
        store.allow_all().await;
        assert!(store.subscribe(&p).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = MemoryStore::new();
        store.delete(&path("nothing"), Precondition::None).await.unwrap();
        assert_eq!(store.document_count().await, 0);
    }
}

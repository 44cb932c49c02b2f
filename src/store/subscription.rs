//! Snapshot Subscriptions
//!
//! A subscription yields the current state of everything it watches
//! first, then every later change, in revision order per document.
//! Dropping it unsubscribes.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::store::error::StoreError;
use crate::store::path::DocumentPath;
use crate::store::snapshot::{Revision, Snapshot};

/// Filter deciding which snapshots a subscription sees.
pub type Predicate = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// Live stream of snapshots.
pub struct Subscription {
    backlog: VecDeque<Snapshot>,
    receiver: broadcast::Receiver<Snapshot>,
    filter: Predicate,
    last_seen: BTreeMap<DocumentPath, Revision>,
}

impl Subscription {
    /// Build from an initial state and a change feed.
    ///
    /// The receiver must have been created before `initial` was read so
    /// that no change is missed. Changes already covered by `initial`
    /// are skipped.
    pub fn new(initial: Vec<Snapshot>, receiver: broadcast::Receiver<Snapshot>, filter: Predicate) -> Self {
        let last_seen = initial.iter().map(|s| (s.path.clone(), s.revision)).collect();
        Self {
            backlog: initial.into(),
            receiver,
            filter,
            last_seen,
        }
    }

    /// Next snapshot. `None` once the store is gone.
    ///
    /// `Err(StoreError::Lagged)` means changes were dropped; the caller
    /// should re-read the documents it cares about.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        if let Some(snapshot) = self.backlog.pop_front() {
            return Some(Ok(snapshot));
        }

        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => {
                    if !(self.filter)(&snapshot) {
                        continue;
                    }
                    let seen = self.last_seen.get(&snapshot.path).copied().unwrap_or(0);
                    if snapshot.revision <= seen {
                        continue;
                    }
                    self.last_seen.insert(snapshot.path.clone(), snapshot.revision);
                    return Some(Ok(snapshot));
                }
                Err(RecvError::Lagged(skipped)) => return Some(Err(StoreError::Lagged(skipped))),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("backlog", &self.backlog.len())
            .field("watched", &self.last_seen.len())
            .finish()
    }
}

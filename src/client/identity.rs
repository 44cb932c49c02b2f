//! Participant Identity
//!
//! Authentication happens elsewhere; the client only needs a stable,
//! opaque participant id once it becomes available.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::tournament::state::PlayerId;

/// Source of the local participant's id.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The id, if already known.
    fn participant_id(&self) -> Option<PlayerId>;

    /// Wait until the id is known. `None` if the provider shut down first.
    async fn ready(&self) -> Option<PlayerId>;
}

/// Identity assigned in-process.
#[derive(Debug)]
pub struct StaticIdentity {
    tx: watch::Sender<Option<PlayerId>>,
}

impl StaticIdentity {
    /// Identity that is ready immediately.
    pub fn new(id: PlayerId) -> Self {
        let (tx, _) = watch::channel(Some(id));
        Self { tx }
    }

    /// Identity with a random id.
    pub fn random() -> Self {
        Self::new(PlayerId::random())
    }

    /// Identity that becomes ready on `resolve`.
    pub fn pending() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Assign the id and wake waiters.
    pub fn resolve(&self, id: PlayerId) {
        self.tx.send_replace(Some(id));
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn participant_id(&self) -> Option<PlayerId> {
        self.tx.borrow().clone()
    }

    async fn ready(&self) -> Option<PlayerId> {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(id) = rx.borrow_and_update().clone() {
                return Some(id);
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

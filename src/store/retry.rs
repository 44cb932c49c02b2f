//! Retry Wrapper
//!
//! Retries calls that fail with `StoreError::Unavailable`, backing off
//! exponentially. Every other error is returned at once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::store::error::StoreError;
use crate::store::path::DocumentPath;
use crate::store::snapshot::{Precondition, Revision, Snapshot};
use crate::store::subscription::{Predicate, Subscription};
use crate::store::DocumentStore;

/// Store wrapper retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    attempts: u32,
    backoff: Duration,
}

impl<S: DocumentStore> RetryingStore<S> {
    /// Wrap `inner`, trying each call up to `attempts` times.
    pub fn new(inner: S, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &str, path: &DocumentPath, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!("{} {} failed (attempt {}/{}): {}; retrying in {:?}", op, path, attempt, self.attempts, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for RetryingStore<S> {
    async fn get(&self, path: &DocumentPath) -> Result<Snapshot, StoreError> {
        self.retry("get", path, || self.inner.get(path)).await
    }

    async fn set(
        &self,
        path: &DocumentPath,
        document: Value,
        precondition: Precondition,
    ) -> Result<Revision, StoreError> {
        self.retry("set", path, || self.inner.set(path, document.clone(), precondition)).await
    }

    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
        precondition: Precondition,
    ) -> Result<Revision, StoreError> {
        self.retry("update", path, || self.inner.update(path, fields.clone(), precondition)).await
    }

    async fn delete(&self, path: &DocumentPath, precondition: Precondition) -> Result<(), StoreError> {
        self.retry("delete", path, || self.inner.delete(path, precondition)).await
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError> {
        self.retry("subscribe", path, || self.inner.subscribe(path)).await
    }

    async fn subscribe_query(
        &self,
        collection: &DocumentPath,
        predicate: Predicate,
    ) -> Result<Subscription, StoreError> {
        self.retry("subscribe_query", collection, || {
            self.inner.subscribe_query(collection, predicate.clone())
        })
        .await
    }
}

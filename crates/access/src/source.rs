//! The session/principal source seam.
//!
//! The store only needs "give me the current principal's grants"; how they
//! are fetched (HTTP, a local cache, a test fixture) lives behind
//! [`GrantSource`]. Retries and transport policy belong to the implementor.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use portal_auth::{Grant, parse_grant_rows};
use portal_core::DomainError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("grant source unavailable: {0}")]
    Unavailable(String),

    #[error("grant fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed grant payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid grant payload: {0}")]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where a policy store reads the principal's grants from.
///
/// Each call must return the principal's *entire* grant list; the store
/// replaces its policy wholesale and never patches it.
#[async_trait]
pub trait GrantSource: Send + Sync {
    async fn fetch_grants(&self) -> Result<Vec<Grant>, SourceError>;
}

#[async_trait]
impl<S> GrantSource for Arc<S>
where
    S: GrantSource + ?Sized,
{
    async fn fetch_grants(&self) -> Result<Vec<Grant>, SourceError> {
        (**self).fetch_grants().await
    }
}

/// In-memory source for tests/dev.
///
/// Holds either a grant list or an "unavailable" reason; both can be swapped
/// at any time to simulate an administrator editing grants or the backend
/// going away.
#[derive(Debug)]
pub struct StaticGrantSource {
    state: Mutex<Result<Vec<Grant>, String>>,
    fetches: AtomicUsize,
}

impl StaticGrantSource {
    pub fn new(grants: Vec<Grant>) -> Self {
        Self {
            state: Mutex::new(Ok(grants)),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Build from a JSON payload in the wire shape the session backend uses.
    pub fn from_json(payload: &str) -> Result<Self, SourceError> {
        let value: Value = serde_json::from_str(payload)?;
        let parsed = parse_grant_rows(value)?;
        Ok(Self::new(parsed.grants))
    }

    pub fn set_grants(&self, grants: Vec<Grant>) {
        *self.lock() = Ok(grants);
    }

    pub fn set_unavailable(&self, reason: impl Into<String>) {
        *self.lock() = Err(reason.into());
    }

    /// How many times `fetch_grants` has been called.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Result<Vec<Grant>, String>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GrantSource for StaticGrantSource {
    async fn fetch_grants(&self) -> Result<Vec<Grant>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.lock().clone().map_err(SourceError::Unavailable)
    }
}

/// Adapter for hosts that can produce the raw JSON row payload.
///
/// The closure does the transport (typically an authenticated HTTP GET);
/// this adapter applies the optional timeout and the row-parsing boundary.
/// Rejected rows are logged by the parser and left out.
pub struct JsonRowsSource<F> {
    fetch: F,
    timeout: Option<Duration>,
}

impl<F, Fut> JsonRowsSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<F, Fut> GrantSource for JsonRowsSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn fetch_grants(&self) -> Result<Vec<Grant>, SourceError> {
        let request = (self.fetch)();

        let payload = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| SourceError::Timeout(limit))??,
            None => request.await?,
        };

        let parsed = parse_grant_rows(payload)?;
        if !parsed.rejected.is_empty() {
            tracing::warn!(
                accepted = parsed.grants.len(),
                rejected = parsed.rejected.len(),
                "grant payload contained rejected rows"
            );
        }

        Ok(parsed.grants)
    }
}

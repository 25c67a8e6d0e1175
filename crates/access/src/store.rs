//! Per-principal policy store.
//!
//! Lifecycle: `Loading → Ready → Ready → ...`. The store is created in
//! `Loading` with an empty policy, becomes `Ready` once the first grant list
//! (possibly empty) has been fetched and built, and from then on only swaps
//! its policy snapshot on rebuild. A principal change means a new store.
//!
//! ## Publication ordering
//!
//! Every refresh takes a monotonically increasing ticket *before* it starts
//! fetching. When the fetch completes, the freshly built policy is published
//! only if its ticket is newer than the one currently published; older
//! completions are discarded as superseded. Publication happens under the
//! state write lock, so subscribers observe versions in increasing order and
//! readers only ever see complete snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use portal_auth::{Action, Policy, build, can, can_with_inheritance};
use portal_core::PrincipalId;
use portal_events::{EventBus, InMemoryEventBus, RefreshTrigger, Subscription, SubscriptionId};

use crate::source::GrantSource;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    /// No grant list has been read yet.
    Loading,
    /// A policy built from a complete grant list is published.
    Ready,
}

/// Consistent view of the store at one instant.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub policy: Arc<Policy>,
    pub status: StoreStatus,
    /// Ticket of the refresh that produced `policy` (0 while loading).
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PolicySnapshot {
    fn loading() -> Self {
        Self {
            policy: Arc::new(Policy::empty()),
            status: StoreStatus::Loading,
            version: 0,
            updated_at: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == StoreStatus::Loading
    }

    /// Exact-match query; `false` while loading.
    pub fn can(&self, action: Action, path: &str) -> bool {
        can(&self.policy, action, path)
    }

    /// Prefix-aware query; `false` while loading.
    pub fn can_with_inheritance(&self, action: Action, path: &str) -> bool {
        can_with_inheritance(&self.policy, action, path)
    }
}

/// Message sent to store subscribers after every successful rebuild.
#[derive(Debug, Clone)]
pub struct PolicyUpdate {
    pub principal_id: PrincipalId,
    pub version: u64,
    pub policy: Arc<Policy>,
    pub trigger: RefreshTrigger,
    pub published_at: DateTime<Utc>,
}

/// What a single refresh attempt ended up doing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new policy was built and published under `version`.
    Published { version: u64 },
    /// A newer refresh published first; this result was discarded.
    Superseded { ticket: u64, current: u64 },
    /// The grant source failed; the previous state is kept.
    SourceUnavailable,
}

/// Process-wide, per-principal holder of the current [`Policy`].
///
/// Constructed by the host for one principal and shared (typically behind an
/// `Arc`) with every screen and the route guard.
pub struct PolicyStore<S> {
    principal_id: PrincipalId,
    source: S,
    state: RwLock<PolicySnapshot>,
    tickets: AtomicU64,
    updates: InMemoryEventBus<PolicyUpdate>,
}

impl<S> PolicyStore<S>
where
    S: GrantSource,
{
    pub fn new(principal_id: PrincipalId, source: S) -> Self {
        Self {
            principal_id,
            source,
            state: RwLock::new(PolicySnapshot::loading()),
            tickets: AtomicU64::new(0),
            updates: InMemoryEventBus::new(),
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        // Only complete snapshots are ever written, so a poisoned lock still
        // holds a consistent value.
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn policy(&self) -> Arc<Policy> {
        self.snapshot().policy
    }

    pub fn status(&self) -> StoreStatus {
        self.snapshot().status
    }

    pub fn is_loading(&self) -> bool {
        self.status() == StoreStatus::Loading
    }

    /// Exact-match query against the current policy.
    pub fn can(&self, action: Action, path: &str) -> bool {
        self.snapshot().can(action, path)
    }

    /// Prefix-aware query against the current policy.
    pub fn can_with_inheritance(&self, action: Action, path: &str) -> bool {
        self.snapshot().can_with_inheritance(action, path)
    }

    /// Register for [`PolicyUpdate`]s.
    pub fn subscribe(&self) -> Subscription<PolicyUpdate> {
        self.updates.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    /// First read after construction.
    pub async fn load(&self) -> RefreshOutcome {
        self.refresh(RefreshTrigger::Initial).await
    }

    /// Re-read grants, rebuild, and publish.
    ///
    /// Never fails outward: an unavailable source is logged and leaves the
    /// store as it was (still loading, or on its last good policy).
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(principal_id = %self.principal_id, ticket, %trigger, "refreshing policy");

        let grants = match self.source.fetch_grants().await {
            Ok(grants) => grants,
            Err(err) => {
                tracing::warn!(
                    principal_id = %self.principal_id,
                    ticket,
                    %trigger,
                    error = %err,
                    "grant source unavailable; keeping previous policy"
                );
                return RefreshOutcome::SourceUnavailable;
            }
        };

        let policy = Arc::new(build(&grants));
        self.publish(ticket, trigger, policy)
    }

    fn publish(&self, ticket: u64, trigger: RefreshTrigger, policy: Arc<Policy>) -> RefreshOutcome {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        if ticket <= state.version {
            tracing::debug!(
                principal_id = %self.principal_id,
                ticket,
                current = state.version,
                "discarding superseded policy"
            );
            return RefreshOutcome::Superseded {
                ticket,
                current: state.version,
            };
        }

        let now = Utc::now();
        *state = PolicySnapshot {
            policy: Arc::clone(&policy),
            status: StoreStatus::Ready,
            version: ticket,
            updated_at: Some(now),
        };

        let update = PolicyUpdate {
            principal_id: self.principal_id,
            version: ticket,
            policy,
            trigger,
            published_at: now,
        };

        if let Err(err) = self.updates.publish(update) {
            tracing::warn!(principal_id = %self.principal_id, error = ?err, "failed to notify policy subscribers");
        }

        tracing::info!(
            principal_id = %self.principal_id,
            version = ticket,
            %trigger,
            keys = state.policy.len(),
            "policy published"
        );

        RefreshOutcome::Published { version: ticket }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use portal_auth::{Grant, PROFILE_PATH};

    use super::*;
    use crate::source::{SourceError, StaticGrantSource};

    fn store_with(grants: Vec<Grant>) -> PolicyStore<StaticGrantSource> {
        PolicyStore::new(PrincipalId::new(), StaticGrantSource::new(grants))
    }

    #[test]
    fn starts_loading_with_an_empty_policy() {
        let store = store_with(Vec::new());

        assert!(store.is_loading());
        assert_eq!(store.snapshot().version, 0);
        assert!(store.policy().is_empty());
        assert!(!store.can(Action::Read, PROFILE_PATH));
        assert_eq!(store.source().fetch_count(), 0);
    }

    #[tokio::test]
    async fn first_load_makes_it_ready_even_with_no_grants() {
        let store = store_with(Vec::new());

        assert_eq!(store.load().await, RefreshOutcome::Published { version: 1 });
        assert_eq!(store.status(), StoreStatus::Ready);
        assert!(store.can(Action::Read, "/feed/profile"));
        assert!(!store.can(Action::Read, "/compras"));
        assert!(store.snapshot().updated_at.is_some());
    }

    #[tokio::test]
    async fn stays_ready_and_swaps_policy_on_rebuild() {
        let store = store_with(vec![Grant::new("compras", "/compras").with_view()]);
        store.load().await;
        assert!(store.can_with_inheritance(Action::Read, "/compras/cotacao"));

        store.source().set_grants(Vec::new());
        let outcome = store.refresh(RefreshTrigger::GrantsChanged).await;

        assert_eq!(outcome, RefreshOutcome::Published { version: 2 });
        assert_eq!(store.status(), StoreStatus::Ready);
        assert!(!store.can_with_inheritance(Action::Read, "/compras/cotacao"));
    }

    #[tokio::test]
    async fn unavailable_source_keeps_loading_state() {
        let store = store_with(Vec::new());
        store.source().set_unavailable("offline");

        assert_eq!(store.load().await, RefreshOutcome::SourceUnavailable);
        assert!(store.is_loading());

        store.source().set_grants(Vec::new());
        assert_eq!(store.refresh(RefreshTrigger::Manual).await, RefreshOutcome::Published { version: 2 });
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn unavailable_source_keeps_last_good_policy() {
        let store = store_with(vec![Grant::new("estoque", "/estoque").with_view().with_edit()]);
        store.load().await;
        let before = store.policy();

        store.source().set_unavailable("timeout");
        assert_eq!(
            store.refresh(RefreshTrigger::FocusRegained).await,
            RefreshOutcome::SourceUnavailable
        );

        assert!(Arc::ptr_eq(&before, &store.policy()));
        assert!(store.can(Action::Update, "/estoque"));
    }

    #[tokio::test]
    async fn publishes_updates_to_subscribers_until_unsubscribed() {
        let store = store_with(vec![Grant::new("sac", "/sac").with_view()]);
        let sub = store.subscribe();

        store.load().await;
        let update = sub.try_recv().unwrap();
        assert_eq!(update.version, 1);
        assert_eq!(update.trigger, RefreshTrigger::Initial);
        assert_eq!(update.principal_id, store.principal_id());
        assert!(Arc::ptr_eq(&update.policy, &store.policy()));

        assert!(store.unsubscribe(sub.id()));
        store.refresh(RefreshTrigger::Manual).await;
        assert!(sub.try_recv().is_err());
    }

    /// Source whose fetches complete only when the test releases them.
    #[derive(Default)]
    struct GatedSource {
        gates: Mutex<VecDeque<oneshot::Receiver<Vec<Grant>>>>,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn gate(&self) -> oneshot::Sender<Vec<Grant>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GrantSource for GatedSource {
        async fn fetch_grants(&self) -> Result<Vec<Grant>, SourceError> {
            let gate = self.gates.lock().unwrap().pop_front();
            self.calls.fetch_add(1, Ordering::SeqCst);
            match gate {
                Some(rx) => rx.await.map_err(|_| SourceError::Unavailable("gate dropped".into())),
                None => Err(SourceError::Unavailable("no gate".into())),
            }
        }
    }

    async fn wait_for_calls(source: &GatedSource, n: usize) {
        while source.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn stale_completion_is_superseded_by_newer_refresh() {
        let store = Arc::new(PolicyStore::new(PrincipalId::new(), GatedSource::default()));
        let sub = store.subscribe();

        let older_gate = store.source().gate();
        let newer_gate = store.source().gate();

        let older = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.refresh(RefreshTrigger::FocusRegained).await }
        });
        wait_for_calls(store.source(), 1).await;

        let newer = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.refresh(RefreshTrigger::Manual).await }
        });
        wait_for_calls(store.source(), 2).await;

        newer_gate
            .send(vec![Grant::new("compras", "/compras").with_view()])
            .unwrap();
        assert_eq!(newer.await.unwrap(), RefreshOutcome::Published { version: 2 });

        older_gate
            .send(vec![Grant::new("estoque", "/estoque").with_view()])
            .unwrap();
        assert_eq!(
            older.await.unwrap(),
            RefreshOutcome::Superseded { ticket: 1, current: 2 }
        );

        assert!(store.can(Action::Read, "/compras"));
        assert!(!store.can(Action::Read, "/estoque"));

        let versions: Vec<u64> = std::iter::from_fn(|| sub.try_recv().ok()).map(|u| u.version).collect();
        assert_eq!(versions, vec![2]);
    }
}

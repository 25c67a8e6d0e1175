//! Navigation guard.
//!
//! Every navigation (and every policy publication while the principal sits on
//! a protected screen) is answered with a [`GuardDecision`]:
//!
//! 1. unguarded paths (login, forbidden destination, configured public
//!    screens) are always allowed, so the guard can never redirect in a loop
//! 2. while the store is still loading the decision is deferred, never denied
//! 3. otherwise Read with prefix inheritance decides between allow and
//!    redirect to the forbidden destination

use portal_auth::{Action, Policy, can_with_inheritance};
use portal_core::{PathKey, normalize};
use portal_events::{Subscription, SubscriptionId};

use crate::config::GuardConfig;
use crate::source::GrantSource;
use crate::store::{PolicySnapshot, PolicyStore, PolicyUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the requested screen.
    Allow,
    /// Grants are still in flight; ask again once the store publishes.
    Defer,
    /// Navigate to `to` instead.
    Redirect { to: PathKey },
}

#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    config: GuardConfig,
}

impl RouteGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Decide a navigation to `path` against the store's current state.
    pub fn on_navigate<S>(&self, store: &PolicyStore<S>, path: &str) -> GuardDecision
    where
        S: GrantSource,
    {
        self.evaluate(path, &store.snapshot())
    }

    /// Decide `path` against an explicit snapshot.
    pub fn evaluate(&self, path: &str, snapshot: &PolicySnapshot) -> GuardDecision {
        let key = normalize(path);

        if self.config.is_unguarded(&key) {
            return GuardDecision::Allow;
        }

        if snapshot.is_loading() {
            tracing::debug!(path = %key, "deferring navigation until grants are loaded");
            return GuardDecision::Defer;
        }

        self.decide(&key, &snapshot.policy)
    }

    fn decide(&self, key: &PathKey, policy: &Policy) -> GuardDecision {
        if can_with_inheritance(policy, Action::Read, key.as_str()) {
            tracing::debug!(path = %key, "navigation allowed");
            GuardDecision::Allow
        } else {
            tracing::info!(path = %key, to = %self.config.forbidden_path, "navigation denied; redirecting");
            GuardDecision::Redirect {
                to: self.config.forbidden_path.clone(),
            }
        }
    }
}

/// A guard bound to one principal's navigation.
///
/// Remembers the screen currently shown and re-checks it whenever the store
/// publishes a new policy, so a revocation mid-session redirects without
/// waiting for the next navigation, and a deferred navigation resolves as
/// soon as the first policy lands.
#[derive(Debug)]
pub struct GuardSession {
    guard: RouteGuard,
    current: Option<PathKey>,
    updates: Subscription<PolicyUpdate>,
}

impl GuardSession {
    pub fn attach<S>(guard: RouteGuard, store: &PolicyStore<S>) -> Self
    where
        S: GrantSource,
    {
        Self {
            guard,
            current: None,
            updates: store.subscribe(),
        }
    }

    pub fn current_path(&self) -> Option<&PathKey> {
        self.current.as_ref()
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.updates.id()
    }

    /// Record a navigation and decide it.
    pub fn navigate<S>(&mut self, store: &PolicyStore<S>, path: &str) -> GuardDecision
    where
        S: GrantSource,
    {
        let decision = self.guard.on_navigate(store, path);
        self.settle(normalize(path), &decision);
        decision
    }

    /// Re-check the current screen against a freshly published policy.
    ///
    /// Returns `None` when nothing is being shown or the current screen is
    /// unguarded.
    pub fn on_policy_update(&mut self, update: &PolicyUpdate) -> Option<GuardDecision> {
        let current = self.current.clone()?;
        if self.guard.config().is_unguarded(&current) {
            return None;
        }

        let decision = self.guard.decide(&current, &update.policy);
        self.settle(current, &decision);
        Some(decision)
    }

    /// Drain pending publications and re-check against the newest one.
    pub fn poll(&mut self) -> Option<GuardDecision> {
        let update = self.updates.latest()?;
        self.on_policy_update(&update)
    }

    /// Stop listening to the store.
    pub fn detach<S>(self, store: &PolicyStore<S>) -> bool
    where
        S: GrantSource,
    {
        store.unsubscribe(self.updates.id())
    }

    fn settle(&mut self, requested: PathKey, decision: &GuardDecision) {
        self.current = Some(match decision {
            GuardDecision::Redirect { to } => to.clone(),
            GuardDecision::Allow | GuardDecision::Defer => requested,
        });
    }
}

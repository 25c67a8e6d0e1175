//! `portal-access` — runtime side of the authorization layer.
//!
//! Owns the per-principal [`PolicyStore`] (fetch grants, rebuild, publish),
//! the worker that turns change notifications into rebuilds, and the
//! [`RouteGuard`] every navigation goes through.

pub mod config;
pub mod guard;
pub mod source;
pub mod store;
pub mod worker;

pub use config::GuardConfig;
pub use guard::{GuardDecision, GuardSession, RouteGuard};
pub use source::{GrantSource, JsonRowsSource, SourceError, StaticGrantSource};
pub use store::{PolicySnapshot, PolicyStore, PolicyUpdate, RefreshOutcome, StoreStatus};
pub use worker::{DEFAULT_REFRESH_TIMEOUT, RefreshWorker, WorkerHandle};

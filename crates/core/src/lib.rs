//! `portal-core` — shared primitives for the portal authorization layer.
//!
//! This crate contains **pure** building blocks (no IO, no async).

pub mod error;
pub mod id;
pub mod path;

pub use error::{DomainError, DomainResult};
pub use id::PrincipalId;
pub use path::{PathKey, normalize};

//! `portal-auth` — path-scoped capability engine (pure, zero-trust).
//!
//! Grants come in, an immutable [`Policy`] comes out, and every screen asks
//! the policy yes/no questions. This crate is intentionally decoupled from
//! transport, storage and async.

pub mod ability;
pub mod action;
pub mod grant;
pub mod policy;

pub use ability::{AbilityExplanation, DecisionBasis, QueryMode, can, can_with_inheritance, explain};
pub use action::Action;
pub use grant::{Grant, ParsedGrants, RawGrant, RejectedGrant, parse_grant_rows};
pub use policy::{Capabilities, PROFILE_PATH, Policy, build};

//! In-process pub/sub plumbing for the portal authorization layer.
//!
//! Two kinds of messages flow through here: change notifications that tell a
//! policy store to re-read grants ([`RefreshTrigger`]), and whatever the store
//! publishes to its own subscribers after a rebuild.

pub mod bus;
pub mod in_memory_bus;
pub mod trigger;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use trigger::RefreshTrigger;

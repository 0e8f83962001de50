//! `schoolgate-events`: identity-provider change events and the
//! handler-based bus they are delivered on.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, EventHandler, Subscription, SubscriptionId};
pub use event::{AuthEvent, AuthEventKind};
pub use in_memory_bus::{EventBusError, InMemoryEventBus};

//! Callback-based publish/subscribe abstraction (mechanics only).
//!
//! Identity providers push change notifications to registered handlers
//! rather than to pull-style queues. The handler runs on the publisher's call
//! stack, often while the publisher still holds its own internal locks, so a
//! handler must never call back into the publisher synchronously. Anything
//! that needs the publisher again has to be handed off to a later turn of the
//! scheduler.
//!
//! ## Delivery guarantees
//!
//! - **At-least-once**: the same message may be delivered more than once;
//!   handlers must be idempotent.
//! - **Broadcast**: every live subscription sees every published message.
//! - **No persistence**: a subscriber registered after a publish never sees it.

use std::sync::Arc;

/// Handler invoked for every published message.
pub type EventHandler<M> = Arc<dyn Fn(&M) + Send + Sync>;

/// Identifier of a registered handler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Handle for a registered handler.
///
/// Unsubscribing is deterministic: it happens exactly once, either through
/// [`Subscription::unsubscribe`] or when the handle is dropped. Once it has
/// returned, the handler is never invoked by a publish that starts afterwards.
pub struct Subscription {
    id: SubscriptionId,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.release_handler();
    }

    fn release_handler(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_handler();
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish` returns how many handlers the message was delivered to.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<usize, Self::Error>;

    fn subscribe(&self, handler: EventHandler<M>) -> Subscription;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self, handler: EventHandler<M>) -> Subscription {
        (**self).subscribe(handler)
    }
}

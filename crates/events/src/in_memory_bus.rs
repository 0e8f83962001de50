//! In-memory pub/sub bus for tests/dev.

use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;

use crate::bus::{EventBus, EventHandler, Subscription, SubscriptionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("event bus registry lock poisoned")]
    Poisoned,
}

struct Registry<M> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, EventHandler<M>)>,
}

impl<M> Default for Registry<M> {
    fn default() -> Self {
        Self {
            next_id: 1,
            handlers: Vec::new(),
        }
    }
}

/// In-memory handler fan-out.
///
/// - No IO / no async
/// - Handlers run synchronously on the publisher's thread, in registration order
/// - The registry lock is released before handlers run, so a handler may drop
///   its own (or another) subscription without deadlocking
pub struct InMemoryEventBus<M> {
    registry: Arc<Mutex<Registry<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .map(|reg| reg.handlers.len())
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn release<M>(registry: &Weak<Mutex<Registry<M>>>, id: SubscriptionId) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    // A poisoned registry still gets the handler removed.
    let mut reg = match registry.lock() {
        Ok(reg) => reg,
        Err(poisoned) => poisoned.into_inner(),
    };
    reg.handlers.retain(|(hid, _)| *hid != id);
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Send + 'static,
{
    type Error = EventBusError;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        let handlers: Vec<EventHandler<M>> = {
            let reg = self.registry.lock().map_err(|_| EventBusError::Poisoned)?;
            reg.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        for handler in &handlers {
            handler(&message);
        }

        tracing::trace!(delivered = handlers.len(), "event published");
        Ok(handlers.len())
    }

    fn subscribe(&self, handler: EventHandler<M>) -> Subscription {
        let mut reg = match self.registry.lock() {
            Ok(reg) => reg,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = SubscriptionId::new(reg.next_id);
        reg.next_id += 1;
        reg.handlers.push((id, handler));
        drop(reg);

        let registry = Arc::downgrade(&self.registry);
        Subscription::new(id, move || release(&registry, id))
    }
}

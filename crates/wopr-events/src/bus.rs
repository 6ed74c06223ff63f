//! The process-wide event bus.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::event::{HookEvent, HookOutcome, WoprEvent};
use crate::subscriber::{HookRegistry, HookSubscriber, SubscriberId, SubscriberRegistry};

/// Default broadcast channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A single process-wide typed publish/subscribe bus.
///
/// Pure notifications ([`WoprEvent`]) are delivered to synchronous
/// subscribers immediately and broadcast to any async [`EventReceiver`]s.
/// Mutable pre-hooks ([`HookEvent`]) run synchronously, in priority order,
/// within the caller's own call stack — the dispatch engine awaits
/// [`EventBus::run_hook`] directly rather than polling a channel, since a
/// hook's rewritten payload must be available before dispatch proceeds.
pub struct EventBus {
    sender: broadcast::Sender<Arc<WoprEvent>>,
    notifications: SubscriberRegistry,
    hooks: HookRegistry,
    capacity: usize,
}

impl EventBus {
    /// A new bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A new bus with the given broadcast channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            notifications: SubscriberRegistry::new(),
            hooks: HookRegistry::new(),
            capacity,
        }
    }

    /// Publish a notification event. A handler exception (panic) never
    /// propagates here — it is caught and logged by the registry, and the
    /// originating operation is unaffected.
    ///
    /// Returns the number of live broadcast receivers that got the event.
    pub fn publish(&self, event: WoprEvent) -> usize {
        let event = Arc::new(event);
        tracing::trace!(event_type = %event.event_type(), "publishing event");
        self.notifications.notify(&event);
        match self.sender.send(Arc::clone(&event)) {
            Ok(count) => {
                tracing::debug!(event_type = %event.event_type(), receivers = count, "event published");
                count
            }
            Err(_) => 0,
        }
    }

    /// Run every registered hook for `event.kind`, in priority order,
    /// threading each subscriber's rewritten payload into the next.
    pub fn run_hook(&self, event: HookEvent) -> HookOutcome {
        self.hooks.run(event)
    }

    /// Register a synchronous notification subscriber.
    pub fn subscribe_notifications(
        &self,
        subscriber: Arc<dyn crate::subscriber::EventSubscriber>,
    ) -> SubscriberId {
        self.notifications.register(subscriber)
    }

    /// Remove a previously registered notification subscriber.
    pub fn unsubscribe_notifications(&self, id: SubscriberId) -> bool {
        self.notifications.unregister(id)
    }

    /// Register a mutable pre-hook subscriber.
    pub fn register_hook(&self, subscriber: Arc<dyn HookSubscriber>) -> SubscriberId {
        self.hooks.register(subscriber)
    }

    /// Remove a previously registered hook subscriber.
    pub fn unregister_hook(&self, id: SubscriberId) -> bool {
        self.hooks.unregister(id)
    }

    /// Subscribe for asynchronous broadcast delivery of every published
    /// notification.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// The number of live broadcast receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The configured channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// An async receiver for broadcast notification events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<WoprEvent>>,
}

impl EventReceiver {
    /// Await the next event, skipping past a lagged gap with a warning
    /// rather than returning it as an error.
    pub async fn recv(&mut self) -> Option<Arc<WoprEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event receiver lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Poll for the next event without blocking.
    pub fn try_recv(&mut self) -> Option<Arc<WoprEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event receiver lagged, events dropped");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMetadata, HookEvent, HookKind};
    use wopr_core::{InjectionSource, InjectionType};

    fn source() -> InjectionSource {
        InjectionSource::new(InjectionType::Api, chrono::Utc::now())
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let count = bus.publish(WoprEvent::SessionCreate {
            metadata: EventMetadata::new(),
            session: "alice".into(),
        });
        assert_eq!(count, 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "session:create");
    }

    #[tokio::test]
    async fn no_receivers_returns_zero() {
        let bus = EventBus::new();
        let count = bus.publish(WoprEvent::SessionCreate {
            metadata: EventMetadata::new(),
            session: "alice".into(),
        });
        assert_eq!(count, 0);
    }

    struct Reject;
    impl HookSubscriber for Reject {
        fn kind(&self) -> HookKind {
            HookKind::InjectionPending
        }
        fn handle(&self, _event: &HookEvent) -> HookOutcome {
            HookOutcome::Prevent {
                reason: "denied".into(),
            }
        }
    }

    #[test]
    fn run_hook_delegates_to_registry() {
        let bus = EventBus::new();
        bus.register_hook(Arc::new(Reject));

        let outcome = bus.run_hook(HookEvent {
            kind: HookKind::InjectionPending,
            metadata: EventMetadata::new(),
            source: source(),
            payload: "payload".into(),
        });
        assert!(matches!(outcome, HookOutcome::Prevent { .. }));
    }
}

//! Subscriber registries for synchronous notification handlers and
//! priority-ordered mutable pre-hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::event::{HookEvent, HookKind, HookOutcome, WoprEvent};

/// Identifies a registered subscriber so it can later be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

fn next_id() -> SubscriberId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    SubscriberId(COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A filter restricting which events a subscriber receives.
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive every event.
    #[default]
    All,
    /// Receive only events whose `event_type()` is in this set.
    Types(Vec<String>),
}

impl EventFilter {
    fn matches(&self, event: &WoprEvent) -> bool {
        match self {
            Self::All => true,
            Self::Types(types) => types.iter().any(|t| t == event.event_type()),
        }
    }
}

/// A synchronous handler for pure notification events.
pub trait EventSubscriber: Send + Sync {
    /// Called for every event that passes this subscriber's filter.
    fn handle(&self, event: &WoprEvent);
}

/// An [`EventSubscriber`] built from a closure and a filter, for ad-hoc
/// registration without a dedicated type.
pub struct FilterSubscriber<F: Fn(&WoprEvent) + Send + Sync> {
    filter: EventFilter,
    callback: F,
}

impl<F: Fn(&WoprEvent) + Send + Sync> FilterSubscriber<F> {
    /// Build a subscriber that invokes `callback` for events matching
    /// `filter`.
    pub fn new(filter: EventFilter, callback: F) -> Self {
        Self { filter, callback }
    }
}

impl<F: Fn(&WoprEvent) + Send + Sync> EventSubscriber for FilterSubscriber<F> {
    fn handle(&self, event: &WoprEvent) {
        if self.filter.matches(event) {
            (self.callback)(event);
        }
    }
}

/// Registry of synchronous subscribers notified on every publish.
///
/// A handler that panics is caught at the call site in [`crate::EventBus`]
/// so one misbehaving subscriber cannot prevent delivery to the rest.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<dyn EventSubscriber>>,
}

impl SubscriberRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, returning an id that can later unregister it.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = next_id();
        self.subscribers.insert(id, subscriber);
        id
    }

    /// Remove a previously registered subscriber. Returns `true` if it was
    /// present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Notify every registered subscriber, catching panics so one
    /// misbehaving handler doesn't stop delivery to the rest.
    pub fn notify(&self, event: &WoprEvent) {
        for entry in &self.subscribers {
            let subscriber = Arc::clone(entry.value());
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.handle(event);
            }));
            if result.is_err() {
                tracing::warn!(event_type = %event.event_type(), "event subscriber panicked");
            }
        }
    }

    /// The number of currently registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether the registry has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// A priority-ordered handler for a mutable pre-hook point. Lower
/// `priority` values run first.
pub trait HookSubscriber: Send + Sync {
    /// Which hook point this subscriber participates in.
    fn kind(&self) -> HookKind;

    /// Ordering among subscribers of the same kind; lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Handle the event, returning whether processing should continue
    /// (optionally with rewritten content) or stop.
    fn handle(&self, event: &HookEvent) -> HookOutcome;
}

/// Registry of mutable pre-hook subscribers, run synchronously and in
/// priority order within a single dispatch's critical path.
#[derive(Default)]
pub struct HookRegistry {
    subscribers: DashMap<SubscriberId, Arc<dyn HookSubscriber>>,
}

impl HookRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook subscriber.
    pub fn register(&self, subscriber: Arc<dyn HookSubscriber>) -> SubscriberId {
        let id = next_id();
        self.subscribers.insert(id, subscriber);
        id
    }

    /// Remove a previously registered hook subscriber.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Run every subscriber of `event.kind` in priority order, threading
    /// each one's output into the next. Stops at the first `Prevent`.
    pub fn run(&self, mut event: HookEvent) -> HookOutcome {
        let mut ordered: Vec<Arc<dyn HookSubscriber>> = self
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .filter(|s| s.kind() == event.kind)
            .collect();
        ordered.sort_by_key(|s| s.priority());

        for subscriber in ordered {
            match subscriber.handle(&event) {
                HookOutcome::Continue(payload) => event.payload = payload,
                prevent @ HookOutcome::Prevent { .. } => return prevent,
            }
        }
        HookOutcome::Continue(event.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use std::sync::Mutex;
    use wopr_core::{InjectionSource, InjectionType};

    #[test]
    fn registry_notifies_registered_subscribers() {
        let registry = SubscriberRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        registry.register(Arc::new(FilterSubscriber::new(EventFilter::All, move |e| {
            seen_clone.lock().unwrap().push(e.event_type().to_string());
        })));

        registry.notify(&WoprEvent::SessionCreate {
            metadata: EventMetadata::new(),
            session: "alice".into(),
        });

        assert_eq!(seen.lock().unwrap().as_slice(), ["session:create"]);
    }

    #[test]
    fn filter_types_restricts_delivery() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        registry.register(Arc::new(FilterSubscriber::new(
            EventFilter::Types(vec!["session:destroy".into()]),
            move |_| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            },
        )));

        registry.notify(&WoprEvent::SessionCreate {
            metadata: EventMetadata::new(),
            session: "alice".into(),
        });
        assert_eq!(count.load(Ordering::Relaxed), 0);

        registry.notify(&WoprEvent::SessionDestroy {
            metadata: EventMetadata::new(),
            session: "alice".into(),
        });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    struct Uppercase(i32);
    impl HookSubscriber for Uppercase {
        fn kind(&self) -> HookKind {
            HookKind::MessageIncoming
        }
        fn priority(&self) -> i32 {
            self.0
        }
        fn handle(&self, event: &HookEvent) -> HookOutcome {
            HookOutcome::Continue(event.payload.to_uppercase())
        }
    }

    struct Blocker;
    impl HookSubscriber for Blocker {
        fn kind(&self) -> HookKind {
            HookKind::MessageIncoming
        }
        fn priority(&self) -> i32 {
            10
        }
        fn handle(&self, _event: &HookEvent) -> HookOutcome {
            HookOutcome::Prevent {
                reason: "blocked".into(),
            }
        }
    }

    fn source() -> InjectionSource {
        InjectionSource::new(InjectionType::Api, chrono::Utc::now())
    }

    #[test]
    fn hooks_run_in_priority_order_and_thread_output() {
        let registry = HookRegistry::new();
        registry.register(Arc::new(Uppercase(0)));

        let event = HookEvent {
            kind: HookKind::MessageIncoming,
            metadata: EventMetadata::new(),
            source: source(),
            payload: "hello".into(),
        };
        let outcome = registry.run(event);
        assert!(matches!(outcome, HookOutcome::Continue(ref s) if s == "HELLO"));
    }

    #[test]
    fn prevent_short_circuits_remaining_hooks() {
        let registry = HookRegistry::new();
        registry.register(Arc::new(Blocker));
        registry.register(Arc::new(Uppercase(20)));

        let event = HookEvent {
            kind: HookKind::MessageIncoming,
            metadata: EventMetadata::new(),
            source: source(),
            payload: "hello".into(),
        };
        let outcome = registry.run(event);
        assert!(matches!(outcome, HookOutcome::Prevent { .. }));
    }
}

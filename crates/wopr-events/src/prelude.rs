//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_events::prelude::*;` to import the event bus, event, and
//! subscriber types most crates need.

pub use crate::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};

pub use crate::{EventMetadata, HookEvent, HookKind, HookOutcome, WoprEvent};

pub use crate::{
    EventFilter, EventSubscriber, FilterSubscriber, HookRegistry, HookSubscriber, SubscriberId,
    SubscriberRegistry,
};

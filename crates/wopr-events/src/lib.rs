//! Typed publish/subscribe event bus for WOPR.
//!
//! Two kinds of events flow through the [`EventBus`]:
//!
//! - Pure notifications ([`WoprEvent`]) — `session:create`, `tool:invoked`,
//!   and friends — delivered to synchronous subscribers immediately and to
//!   async receivers via a broadcast channel.
//! - Mutable pre-hooks ([`HookEvent`]) — `message:incoming`,
//!   `message:outgoing`, `injection:pending` — run synchronously, in
//!   priority order, within the dispatch path itself, and may rewrite or
//!   block the payload via [`HookOutcome`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bus;
pub mod event;
pub mod prelude;
pub mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventMetadata, HookEvent, HookKind, HookOutcome, WoprEvent};
pub use subscriber::{
    EventFilter, EventSubscriber, FilterSubscriber, HookRegistry, HookSubscriber, SubscriberId,
    SubscriberRegistry,
};

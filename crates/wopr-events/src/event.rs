//! Event payload types.

use serde::{Deserialize, Serialize};
use wopr_core::{InjectionSource, Timestamp};

/// Metadata common to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// When the event was produced.
    pub ts: Timestamp,
    /// The session the event concerns, if any.
    pub session: Option<String>,
}

impl EventMetadata {
    /// Metadata stamped with the current time and no session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ts: chrono::Utc::now(),
            session: None,
        }
    }

    /// Metadata scoped to a session.
    #[must_use]
    pub fn for_session(session: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now(),
            session: Some(session.into()),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A pure notification: published after the fact, never mutates anything,
/// and may be delivered to broadcast subscribers asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WoprEvent {
    /// A session was created.
    SessionCreate {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
    },
    /// A session was destroyed.
    SessionDestroy {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
    },
    /// A work item was enqueued on a session's queue.
    Enqueue {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id assigned to the item.
        inject_id: String,
    },
    /// A work item was popped off its session's queue and marked active.
    Dequeue {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id that was popped.
        inject_id: String,
    },
    /// A worker began running a dequeued item.
    Start {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id that started.
        inject_id: String,
    },
    /// A running item was cancelled before it resolved.
    Cancel {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id that was cancelled.
        inject_id: String,
    },
    /// A running item resolved with an error.
    Error {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id that errored.
        inject_id: String,
        /// The error's display text.
        reason: String,
    },
    /// A running item resolved successfully. Distinct from `SessionResponse`
    /// (which carries the response text for conversation-log consumers);
    /// this is the queue lifecycle's own terminal notification.
    Complete {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id that completed.
        inject_id: String,
    },
    /// A streaming chunk was emitted for an in-flight dispatch.
    SessionStream {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id this chunk belongs to.
        inject_id: String,
        /// The chunk's text.
        chunk: String,
    },
    /// A dispatch produced its final response.
    SessionResponse {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session's name.
        session: String,
        /// The inject id that completed.
        inject_id: String,
    },
    /// A provider was registered with the provider registry.
    CapabilityProviderRegistered {
        /// Event metadata.
        metadata: EventMetadata,
        /// The provider's name.
        provider: String,
    },
    /// A provider was unregistered from the provider registry.
    CapabilityProviderUnregistered {
        /// Event metadata.
        metadata: EventMetadata,
        /// The provider's name.
        provider: String,
    },
    /// A tool was invoked.
    ToolInvoked {
        /// Event metadata.
        metadata: EventMetadata,
        /// The tool's name.
        tool: String,
        /// The session it ran in.
        session: String,
    },
    /// A named event with an arbitrary JSON payload, for extensions that
    /// don't warrant their own variant (this also carries the `stt:*` /
    /// `tts:*` notification kinds, since no speech plugin surface exists
    /// here).
    Custom {
        /// Event metadata.
        metadata: EventMetadata,
        /// The event's name.
        name: String,
        /// The event's payload.
        payload: serde_json::Value,
    },
}

impl WoprEvent {
    /// A short, stable string identifying this event's kind, used for
    /// logging and filter matching.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionCreate { .. } => "session:create",
            Self::SessionDestroy { .. } => "session:destroy",
            Self::Enqueue { .. } => "enqueue",
            Self::Dequeue { .. } => "dequeue",
            Self::Start { .. } => "start",
            Self::Cancel { .. } => "cancel",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
            Self::SessionStream { .. } => "session:stream",
            Self::SessionResponse { .. } => "session:response",
            Self::CapabilityProviderRegistered { .. } => "capability:providerRegistered",
            Self::CapabilityProviderUnregistered { .. } => "capability:providerUnregistered",
            Self::ToolInvoked { .. } => "tool:invoked",
            Self::Custom { name, .. } => name,
        }
    }
}

/// The result of a mutable pre-hook subscriber handling a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HookOutcome {
    /// Processing should continue with (possibly rewritten) content.
    Continue(String),
    /// Processing must stop; the originating operation is rejected.
    Prevent {
        /// Why the hook blocked the operation.
        reason: String,
    },
}

/// The kind of mutable pre-hook an event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// A message arriving into a session, before it reaches the provider.
    MessageIncoming,
    /// A message leaving a session, before it reaches its destination.
    MessageOutgoing,
    /// An injection awaiting a security-kernel decision.
    InjectionPending,
}

/// A mutable pre-hook event: subscribers may rewrite or block the payload.
/// Delivery is synchronous and in priority order, each subscriber's output
/// feeding the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    /// Which hook point this is.
    pub kind: HookKind,
    /// Event metadata.
    pub metadata: EventMetadata,
    /// The source that triggered the hook.
    pub source: InjectionSource,
    /// The payload subscribers may rewrite.
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_spec_vocabulary() {
        let e = WoprEvent::SessionCreate {
            metadata: EventMetadata::new(),
            session: "alice".into(),
        };
        assert_eq!(e.event_type(), "session:create");
    }

    #[test]
    fn custom_event_carries_its_own_name() {
        let e = WoprEvent::Custom {
            metadata: EventMetadata::new(),
            name: "tts:finished".into(),
            payload: serde_json::json!({"voice": "default"}),
        };
        assert_eq!(e.event_type(), "tts:finished");
    }
}

//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_core::prelude::*;` to import the types most crates need:
//! the error taxonomy, trust levels, capabilities, injection sources, and
//! the persisted data model.

pub use crate::{ErrorCategory, ErrorKind};

pub use crate::{Capability, TOOL_CAPABILITY_MAP, tool_capability};

pub use crate::{InjectId, Timestamp};

pub use crate::{AccessPattern, IdentityRef, InjectionSource, InjectionType, SecurityContext};

pub use crate::TrustLevel;

pub use crate::{
    AccessGrant, ApiKey, ApiKeyScope, ChannelRef, ConversationEntry, ConversationEntryType,
    CronHistoryEntry, CronJob, Identity, Peer, ProviderBinding, Session,
};

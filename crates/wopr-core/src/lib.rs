//! WOPR Core - foundation types shared by every crate in the session dispatch core.
//!
//! This crate provides:
//! - The error taxonomy (`ErrorKind`) shared across the management surface
//! - Trust levels and the dotted capability model
//! - The injection source and security-context shapes
//! - The persisted data model: sessions, conversation entries, cron jobs and history,
//!   identities, peers, access grants, and API keys

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod capability;
pub mod error;
pub mod ids;
pub mod injection;
pub mod model;
pub mod prelude;
pub mod trust;

pub use capability::{Capability, TOOL_CAPABILITY_MAP, tool_capability};
pub use error::{ErrorCategory, ErrorKind};
pub use ids::{InjectId, Timestamp};
pub use injection::{AccessPattern, IdentityRef, InjectionSource, InjectionType, SecurityContext};
pub use model::{
    AccessGrant, ApiKey, ApiKeyScope, ChannelRef, ConversationEntry, ConversationEntryType,
    CronHistoryEntry, CronJob, CronScript, Identity, Peer, ProviderBinding, Session,
};
pub use trust::TrustLevel;

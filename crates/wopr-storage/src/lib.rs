//! Persisted state layout for the WOPR daemon.
//!
//! Everything under `WOPR_HOME` — sessions, conversation history, cron jobs
//! and their run history, the daemon's own identity, known peers, access
//! grants, and API keys — goes through the namespaced [`KvStore`]
//! abstraction in [`kv`], backed in production by [`FileKvStore`] (one JSON
//! file per namespace) and typed per entity kind via [`repository`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod kv;
pub mod repository;

pub use error::{StorageError, StorageResult};
pub use kv::{FileKvStore, KvEntry, KvStore, MemoryKvStore, ScopedKvStore};
pub use repository::{
    AccessGrantRepo, ApiKeyRepo, ConversationRepo, CronHistoryRepo, CronJobRepo, IdentityRepo,
    PeerRepo, SessionRepo, Store,
};

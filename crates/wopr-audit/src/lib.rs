//! Chain-linked audit logging for WOPR.
//!
//! Every security decision the kernel makes and every tool invocation a
//! session performs is recorded as an [`AuditEntry`], hash-chained to the
//! entry before it so the history can be verified for tampering without
//! relying on a separate signature per entry.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod entry;
pub mod error;
pub mod log;
pub mod prelude;

pub use entry::{AuditAction, AuditEntry, AuditOutcome};
pub use error::{AuditError, AuditResult};
pub use log::AuditLog;

//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_audit::prelude::*;` to import the audit logging types
//! most crates need.

pub use crate::{AuditError, AuditResult};

pub use crate::{AuditAction, AuditEntry, AuditOutcome};

pub use crate::AuditLog;

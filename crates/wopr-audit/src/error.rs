//! Audit-related error types.

use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(#[from] wopr_storage::StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The requested entry does not exist.
    #[error("audit entry not found: {0}")]
    EntryNotFound(String),

    /// The chain is broken: an entry's `prev_hash` does not match the hash
    /// of the entry actually preceding it.
    #[error("chain integrity violation at entry {entry_id}: {reason}")]
    IntegrityViolation {
        /// The entry where the violation was detected.
        entry_id: String,
        /// Why the chain is invalid.
        reason: String,
    },
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

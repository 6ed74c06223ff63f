//! Runtime error types: queueing, dispatch, and tool execution failures.

use thiserror::Error;
use wopr_core::ErrorKind;

/// Errors raised by the session queue, dispatch engine, or tool surface.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No session exists with the given name.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A session with this name already exists.
    #[error("session already exists: {0}")]
    SessionAlreadyExists(String),

    /// The dispatch or a queued item was cancelled.
    #[error("dispatch cancelled")]
    Cancelled,

    /// A transaction was attempted while one was already open.
    #[error("nested transaction")]
    NestedTransaction,

    /// A named tool has no registered handler.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The security kernel denied this operation.
    #[error("security denial: {0}")]
    SecurityDenied(String),

    /// The provider layer could not service this dispatch.
    #[error(transparent)]
    Llm(#[from] wopr_llm::LlmError),

    /// The security kernel raised an error evaluating this operation.
    #[error(transparent)]
    Security(#[from] wopr_security::SecurityError),

    /// A store read or write failed.
    #[error(transparent)]
    Storage(#[from] wopr_storage::StorageError),

    /// An audit append failed.
    #[error(transparent)]
    Audit(#[from] wopr_audit::AuditError),

    /// A collaborator outside this crate (e.g. the cron scheduler, reached
    /// through a narrow trait seam to avoid a dependency cycle) reported a
    /// failure.
    #[error("{0}")]
    External(String),
}

impl RuntimeError {
    /// Map to the shared error taxonomy for HTTP status and audit codes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::SessionAlreadyExists(_) => ErrorKind::SessionAlreadyExists,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NestedTransaction => ErrorKind::NestedTransaction,
            Self::UnknownTool(_) => ErrorKind::MissingField,
            Self::SecurityDenied(_) => ErrorKind::AccessDenied,
            Self::Llm(err) => err.kind(),
            Self::Security(err) => err.kind(),
            Self::Storage(_) => ErrorKind::ProviderUnavailable,
            Self::Audit(_) => ErrorKind::ProviderUnavailable,
            Self::External(_) => ErrorKind::ProviderUnavailable,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_cancelled_kind() {
        assert_eq!(RuntimeError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn unknown_tool_maps_to_missing_field() {
        let err = RuntimeError::UnknownTool("frobnicate".into());
        assert_eq!(err.kind(), ErrorKind::MissingField);
    }
}

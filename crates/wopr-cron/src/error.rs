//! Error types for schedule parsing, script execution, and job dispatch.

use thiserror::Error;

/// Errors raised while parsing, storing, or firing cron jobs.
#[derive(Debug, Error)]
pub enum CronError {
    /// A schedule string matched neither the 5-field cron grammar nor the
    /// relative/absolute one-shot syntax.
    #[error("invalid cron schedule: {0}")]
    InvalidSchedule(String),

    /// No job with the given name exists.
    #[error("cron job not found: {0}")]
    JobNotFound(String),

    /// A job with the given name already exists.
    #[error("cron job already exists: {0}")]
    JobAlreadyExists(String),

    /// Cron script execution is disabled by configuration, either at
    /// create time or because it was turned off before this job fired.
    #[error("cron script execution is disabled")]
    ScriptsDisabled,

    /// The target session rejected the synthesized injection.
    #[error("injection rejected: {0}")]
    InjectionRejected(String),

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(#[from] wopr_storage::StorageError),

    /// The security kernel failed to evaluate an injection.
    #[error("security error: {0}")]
    Security(#[from] wopr_security::SecurityError),
}

/// Result type for cron operations.
pub type CronResult<T> = Result<T, CronError>;

impl From<CronError> for wopr_core::ErrorKind {
    fn from(err: CronError) -> Self {
        match err {
            CronError::InvalidSchedule(_) => wopr_core::ErrorKind::InvalidSchedule,
            CronError::JobNotFound(_) => wopr_core::ErrorKind::JobNotFound,
            CronError::JobAlreadyExists(_) => wopr_core::ErrorKind::SessionAlreadyExists,
            CronError::ScriptsDisabled => wopr_core::ErrorKind::ScriptsDisabled,
            CronError::InjectionRejected(_) => wopr_core::ErrorKind::AccessDenied,
            CronError::Storage(err) => err.into(),
            CronError::Security(_) => wopr_core::ErrorKind::AccessDenied,
        }
    }
}

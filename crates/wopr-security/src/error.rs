//! `SecurityError`: the kernel's local error type, carrying structured
//! context for the kinds that need it while still mapping onto
//! `wopr_core::ErrorKind` for the management surface's uniform HTTP-status
//! handling.

use wopr_core::{Capability, ErrorKind};

/// A failure from the security kernel's decision pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// The source's trust level does not meet the target's requirement.
    #[error("trust level does not meet the required level")]
    TrustInsufficient,
    /// No access pattern in the target's effective list matched the source.
    #[error("no access pattern matched this source")]
    AccessDenied,
    /// The source lacks the capability required for this operation.
    #[error("missing capability {capability}")]
    CapabilityDenied {
        /// The capability that was required.
        capability: Capability,
        /// The capabilities actually held.
        held: Vec<Capability>,
    },
    /// The target is not a gateway and no gateway can forward to it.
    #[error("target session requires a gateway forward")]
    GatewayRequired,
    /// A rate-limit bucket for this source (or gateway/target pair) is exhausted.
    #[error("rate limit exceeded")]
    RateLimited,
    /// The resolved access grant has expired.
    #[error("access grant has expired")]
    GrantExpired,
    /// An access-pattern string failed to parse.
    #[error("invalid access pattern: {0}")]
    InvalidPattern(String),
    /// Cron script execution is disabled by configuration.
    #[error("cron script execution is disabled")]
    ScriptsDisabled,
    /// The referenced `grantId` does not resolve to any stored grant.
    #[error("unknown access grant {0}")]
    UnknownGrant(String),
    /// A lower-level storage, config, or audit failure.
    #[error(transparent)]
    Storage(#[from] wopr_storage::StorageError),
    /// A configuration read failed.
    #[error(transparent)]
    Config(#[from] wopr_config::ConfigError),
    /// Appending to the audit log failed.
    #[error(transparent)]
    Audit(#[from] wopr_audit::AuditError),
}

impl SecurityError {
    /// The machine-readable kind this error maps to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TrustInsufficient => ErrorKind::TrustInsufficient,
            Self::AccessDenied => ErrorKind::AccessDenied,
            Self::CapabilityDenied { .. } => ErrorKind::CapabilityDenied,
            Self::GatewayRequired => ErrorKind::GatewayRequired,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::GrantExpired => ErrorKind::AccessDenied,
            Self::InvalidPattern(_) => ErrorKind::InvalidPattern,
            Self::ScriptsDisabled => ErrorKind::ScriptsDisabled,
            Self::UnknownGrant(_) => ErrorKind::AccessDenied,
            Self::Storage(err) => match err {
                wopr_storage::StorageError::NotFound(_) => ErrorKind::SessionNotFound,
                wopr_storage::StorageError::AlreadyExists(_) => ErrorKind::SessionAlreadyExists,
                wopr_storage::StorageError::InvalidKey(_) | wopr_storage::StorageError::Serialization(_) => {
                    ErrorKind::MissingField
                }
                wopr_storage::StorageError::Internal(_) => ErrorKind::ProviderUnavailable,
            },
            Self::Config(_) => ErrorKind::MissingField,
            Self::Audit(_) => ErrorKind::ProviderUnavailable,
        }
    }
}

/// The kernel's result alias.
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_denied_maps_to_capability_denied_kind() {
        let err = SecurityError::CapabilityDenied {
            capability: Capability::new("inject.network"),
            held: vec![],
        };
        assert_eq!(err.kind(), ErrorKind::CapabilityDenied);
    }

    #[test]
    fn gateway_required_maps_correctly() {
        assert_eq!(SecurityError::GatewayRequired.kind(), ErrorKind::GatewayRequired);
    }
}

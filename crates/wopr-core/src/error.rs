//! The machine-readable error taxonomy shared by every WOPR crate.
//!
//! Individual crates define their own `thiserror` error types with structured
//! fields, but every variant maps to one of the [`ErrorKind`] values here so
//! the management surface can apply a single, stable status-code mapping
//! (see [`ErrorCategory::http_status`]) regardless of which crate raised it.

use std::fmt;

/// The category a kind belongs to, used for HTTP status mapping and for
/// grouping in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or out-of-range request data.
    Validation,
    /// Missing or invalid credentials.
    Auth,
    /// Authenticated but not permitted.
    Authorization,
    /// The referenced entity does not exist or already exists.
    Lifecycle,
    /// A failure in a downstream collaborator (provider, store, scheduler).
    Runtime,
    /// A cryptographic or replay-protection violation.
    Integrity,
}

impl ErrorCategory {
    /// The stable HTTP status this category maps to, per the error handling
    /// design: validation->400, auth->401, authorization->403,
    /// lifecycle->404/409, runtime->5xx, integrity->400/409.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Auth => 401,
            Self::Authorization => 403,
            Self::Lifecycle => 404,
            Self::Runtime => 500,
            Self::Integrity => 409,
        }
    }
}

/// Every machine-readable error kind in the WOPR taxonomy.
///
/// Crate-local error types carry this alongside any structured context they
/// need (see e.g. `wopr_security::SecurityError`); `ErrorKind` alone is
/// enough to decide the HTTP status and the audit-log code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // validation
    /// A required field was absent.
    MissingField,
    /// An API key scope string did not parse.
    InvalidScope,
    /// An access pattern string did not parse.
    InvalidPattern,
    /// A UUID string did not parse.
    InvalidUuid,
    /// A cron schedule string did not parse.
    InvalidSchedule,

    // auth
    /// No credentials were presented where required.
    Unauthenticated,
    /// The presented token does not match any known credential.
    TokenInvalid,
    /// The presented token was valid but has been revoked.
    TokenRevoked,
    /// The presented API key has expired.
    KeyExpired,

    // authorization
    /// The source's trust level does not meet the requirement.
    TrustInsufficient,
    /// No access pattern in the target's effective list matched the source.
    AccessDenied,
    /// The source lacks the capability required for this operation.
    CapabilityDenied,
    /// The target is not a gateway and no gateway can forward to it.
    GatewayRequired,
    /// Cron script execution is disabled by configuration.
    ScriptsDisabled,

    // lifecycle
    /// No session with the given name exists.
    SessionNotFound,
    /// A session with the given name already exists.
    SessionAlreadyExists,
    /// No cron job with the given name exists.
    JobNotFound,

    // runtime
    /// No configured provider could service the request.
    ProviderUnavailable,
    /// A provider attempt exceeded its configured timeout.
    ProviderTimeout,
    /// The operation was cancelled cooperatively.
    Cancelled,
    /// A transaction was attempted while one was already open.
    NestedTransaction,
    /// A rate-limit bucket was exceeded.
    RateLimited,
    /// No providers are registered at all.
    NoProviders,

    // integrity
    /// A nonce was reused.
    ReplayDetected,
    /// A signature did not verify.
    SignatureInvalid,
    /// A wire envelope declared an unsupported version.
    VersionMismatch,
}

impl ErrorKind {
    /// The category this kind belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        use ErrorKind::{
            AccessDenied, Cancelled, CapabilityDenied, GatewayRequired, InvalidPattern,
            InvalidScope, InvalidSchedule, InvalidUuid, JobNotFound, KeyExpired, MissingField,
            NestedTransaction, NoProviders, ProviderTimeout, ProviderUnavailable, RateLimited,
            ReplayDetected, ScriptsDisabled, SessionAlreadyExists, SessionNotFound,
            SignatureInvalid, TokenInvalid, TokenRevoked, TrustInsufficient, Unauthenticated,
            VersionMismatch,
        };
        match self {
            MissingField | InvalidScope | InvalidPattern | InvalidUuid | InvalidSchedule => {
                ErrorCategory::Validation
            }
            Unauthenticated | TokenInvalid | TokenRevoked | KeyExpired => ErrorCategory::Auth,
            TrustInsufficient | AccessDenied | CapabilityDenied | GatewayRequired
            | ScriptsDisabled => ErrorCategory::Authorization,
            SessionNotFound | SessionAlreadyExists | JobNotFound => ErrorCategory::Lifecycle,
            ProviderUnavailable | ProviderTimeout | Cancelled | NestedTransaction
            | RateLimited | NoProviders => ErrorCategory::Runtime,
            ReplayDetected | SignatureInvalid | VersionMismatch => ErrorCategory::Integrity,
        }
    }

    /// The stable machine-readable code, as used in audit entries and API
    /// error bodies (e.g. `"access_denied"`).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidPattern => "invalid_pattern",
            Self::InvalidUuid => "invalid_uuid",
            Self::InvalidSchedule => "invalid_schedule",
            Self::Unauthenticated => "unauthenticated",
            Self::TokenInvalid => "token_invalid",
            Self::TokenRevoked => "token_revoked",
            Self::KeyExpired => "key_expired",
            Self::TrustInsufficient => "trust_insufficient",
            Self::AccessDenied => "access_denied",
            Self::CapabilityDenied => "capability_denied",
            Self::GatewayRequired => "gateway_required",
            Self::ScriptsDisabled => "scripts_disabled",
            Self::SessionNotFound => "session_not_found",
            Self::SessionAlreadyExists => "session_already_exists",
            Self::JobNotFound => "job_not_found",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::ProviderTimeout => "provider_timeout",
            Self::Cancelled => "cancelled",
            Self::NestedTransaction => "nested_transaction",
            Self::RateLimited => "rate_limited",
            Self::NoProviders => "no_providers",
            Self::ReplayDetected => "replay_detected",
            Self::SignatureInvalid => "signature_invalid",
            Self::VersionMismatch => "version_mismatch",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_http_status_mapping() {
        assert_eq!(ErrorCategory::Validation.http_status(), 400);
        assert_eq!(ErrorCategory::Auth.http_status(), 401);
        assert_eq!(ErrorCategory::Authorization.http_status(), 403);
        assert_eq!(ErrorCategory::Lifecycle.http_status(), 404);
        assert_eq!(ErrorCategory::Runtime.http_status(), 500);
        assert_eq!(ErrorCategory::Integrity.http_status(), 409);
    }

    #[test]
    fn kind_code_and_category_agree() {
        assert_eq!(ErrorKind::AccessDenied.code(), "access_denied");
        assert_eq!(
            ErrorKind::AccessDenied.category(),
            ErrorCategory::Authorization
        );
        assert_eq!(ErrorKind::ScriptsDisabled.code(), "scripts_disabled");
        assert_eq!(
            ErrorKind::ScriptsDisabled.category(),
            ErrorCategory::Authorization
        );
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
    }
}

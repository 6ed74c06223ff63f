//! Provider and query error types.

use thiserror::Error;
use wopr_core::ErrorKind;

/// Errors that can occur while resolving a provider or running a query.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No credential is configured for the named provider.
    #[error("no credential configured for provider {provider}")]
    CredentialNotConfigured { provider: String },

    /// The credential failed the provider's own validation check.
    #[error("credential rejected by provider {provider}")]
    CredentialRejected { provider: String },

    /// The request to the provider failed.
    #[error("request to provider {provider} failed: {message}")]
    RequestFailed { provider: String, message: String },

    /// The provider's per-attempt timeout elapsed.
    #[error("provider {provider} timed out")]
    Timeout { provider: String },

    /// Every entry in the resolution order (explicit binding, fallback
    /// chain, global priority) failed or was unavailable.
    #[error("no providers available")]
    NoProviders,

    /// The named provider id isn't registered.
    #[error("unknown provider {0}")]
    UnknownProvider(String),

    /// A streamed response could not be parsed or ended abnormally.
    #[error("streaming error: {0}")]
    StreamingError(String),

    /// The query was cancelled before it completed.
    #[error("query cancelled")]
    Cancelled,

    /// The conversation exceeds the provider's context window.
    #[error("context length exceeded: {current} tokens, max is {max}")]
    ContextLengthExceeded { current: usize, max: usize },

    /// An HTTP-level transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Map to the shared error taxonomy for HTTP status and audit codes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CredentialNotConfigured { .. } | Self::CredentialRejected { .. } => {
                ErrorKind::Unauthenticated
            }
            Self::RequestFailed { .. } | Self::Http(_) | Self::StreamingError(_) => {
                ErrorKind::ProviderUnavailable
            }
            Self::Timeout { .. } => ErrorKind::ProviderTimeout,
            Self::NoProviders => ErrorKind::NoProviders,
            Self::UnknownProvider(_) => ErrorKind::NoProviders,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ContextLengthExceeded { .. } => ErrorKind::MissingField,
        }
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_providers_maps_to_no_providers_kind() {
        assert_eq!(LlmError::NoProviders.kind(), ErrorKind::NoProviders);
    }

    #[test]
    fn timeout_maps_to_provider_timeout_kind() {
        let err = LlmError::Timeout { provider: "claude".into() };
        assert_eq!(err.kind(), ErrorKind::ProviderTimeout);
    }

    #[test]
    fn credential_not_configured_maps_to_unauthenticated() {
        let err = LlmError::CredentialNotConfigured { provider: "claude".into() };
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }
}

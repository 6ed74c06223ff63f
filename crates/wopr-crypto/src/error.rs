//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur in WOPR cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key of the wrong length was supplied.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// The required length.
        expected: usize,
        /// The length actually supplied.
        actual: usize,
    },

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// Hex decoding failed.
    #[error("invalid hex encoding")]
    InvalidHexEncoding,

    /// Base64 decoding failed.
    #[error("invalid base64 encoding")]
    InvalidBase64Encoding,

    /// An I/O failure during key persistence.
    #[error("key storage I/O error: {0}")]
    IoError(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

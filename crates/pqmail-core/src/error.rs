//! Error types for pqmail core.

use thiserror::Error;

/// Errors raised by the decrypt pipeline.
///
/// Each variant corresponds to exactly one pipeline step, so callers can tell
/// which check rejected a payload. No variant carries secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// The payload was signed by a key other than the pinned server key.
    #[error("server signing key does not match the pinned key")]
    ServerKeyMismatch,

    #[error("format error: {0}")]
    Format(String),

    #[error("size validation failed for {field}: expected {expected} bytes, got {actual}")]
    SizeValidation {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported payload version: {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported {kind} algorithm: {value}")]
    UnsupportedAlgorithm { kind: &'static str, value: String },

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("key decapsulation failed")]
    KeyEncapsulation,

    /// HKDF could not produce the content key.
    #[error("key derivation failed")]
    KeyDerivation,

    /// AEAD tag mismatch.
    #[error("authenticated decryption failed")]
    Authentication,
}

impl DecryptError {
    /// Whether this failure indicates tampering or key substitution.
    ///
    /// Critical failures must always be surfaced to the user.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            DecryptError::ServerKeyMismatch | DecryptError::SignatureVerification
        )
    }
}

/// Errors from key handling and the sealing primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid {kind} key: expected {expected} bytes, got {actual}")]
    InvalidKey {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Result type for the decrypt pipeline.
pub type Result<T> = std::result::Result<T, DecryptError>;

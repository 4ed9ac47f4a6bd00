//! Error types for the client.

use std::time::Duration;

use pqmail_core::DecryptError;
use pqmail_sync::{ApiError, SyncError};
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A payload failed the decrypt pipeline. Never retried.
    #[error("decryption failed: {0}")]
    Decrypt(#[from] DecryptError),

    /// Delivery error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Collaborator API error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Decrypted bytes were not the expected JSON document.
    #[error("invalid email document: {0}")]
    Json(#[from] serde_json::Error),

    /// No matching email arrived in time.
    #[error("no matching email within {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Whether this indicates tampering or a spoofed server.
    pub fn is_critical(&self) -> bool {
        matches!(self, ClientError::Decrypt(e) if e.is_critical())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

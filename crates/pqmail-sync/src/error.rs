//! Error types for the sync module.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur while delivering inbox notifications.
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Reconnection attempts were exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server reports the inbox no longer exists.
    #[error("inbox gone: {0}")]
    InboxGone(String),

    /// A subscription with this inbox id is already registered.
    #[error("inbox already subscribed: {0}")]
    AlreadySubscribed(String),

    /// Collaborator API error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// An event could not be decoded.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The operation was cancelled by the caller.
    #[error("sync cancelled")]
    Cancelled,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

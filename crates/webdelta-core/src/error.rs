use std::time::Duration;

use thiserror::Error;

/// Error types for the webdelta engine and its collaborators.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (non-success status, unreadable body, bad URL).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out after the given limit.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Durable cache storage could not be read, written or removed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A poller is already running on this engine.
    #[error("A poller is already running on this engine")]
    PollerAlreadyRunning,

    /// A task unit panicked (usually inside a user-supplied extractor).
    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}

impl AppError {
    /// Returns true if the error came from fetching a resource.
    ///
    /// Transport failures are never retried by the executor; they are
    /// reported per task and the rest of the cycle carries on.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_) | AppError::NetworkError(_) | AppError::Timeout(_)
        )
    }

    /// Returns true if the error came from durable cache storage.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            AppError::StorageError(_) | AppError::SerializationError(_)
        )
    }
}

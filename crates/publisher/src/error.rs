use thiserror::Error;

/// Errors raised by a publisher backend.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The backend did not accept the message.
    #[error("Failed to publish to {topic}: {reason}")]
    Failed { topic: String, reason: String },

    /// The event could not be turned into a JSON payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The publisher was closed.
    #[error("Publisher is closed")]
    Closed,
}

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, PublishError>;

use thiserror::Error;

/// Result type for Odio operations
pub type Result<T> = std::result::Result<T, OdioError>;

/// Errors that can occur when talking to an Odio host
#[derive(Error, Debug)]
pub enum OdioError {
    /// HTTP transport error (connection refused, DNS, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request or poll timed out
    #[error("Request timeout")]
    Timeout,

    /// The API answered with a non-success status
    #[error("API error ({status}): {detail}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        detail: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response shape did not match the expected contract
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A volume/mute command was issued for an entity with no owning audio client
    #[error("No audio client for entity: {0}")]
    NoAudioClient(String),

    /// The command is not available for this entity in its current configuration
    #[error("Unsupported command: {0}")]
    Unsupported(&'static str),

    /// Update channel error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The runtime has been shut down
    #[error("Shut down")]
    Shutdown,
}

use thiserror::Error;

/// Status codes the transport treats as transient.
pub const TRANSIENT_STATUS_CODES: [u16; 3] = [500, 502, 504];

/// Application-wide error types for contact-sync.
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote service answered with a non-success status outside the retry set.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Every attempt allowed by the retry policy failed.
    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Response body could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A source record is missing data or holds malformed data.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Writing staged results back to the tabular store failed.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status, .. } => TRANSIENT_STATUS_CODES.contains(status),
            _ => false,
        }
    }

    /// Returns true if the request never produced a usable answer.
    ///
    /// A resolver tier that hits one of these fails the whole record,
    /// whereas a plain [`AppError::HttpStatus`] only means the tier found nothing.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            AppError::RetriesExhausted { .. } | AppError::NetworkError(_) | AppError::Timeout(_)
        )
    }
}

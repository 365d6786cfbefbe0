//! Error types for the 115 provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// 115 provider errors
#[derive(Error, Debug)]
pub enum U115Error {
    /// HTTP-level failure
    #[error("115 API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The API answered with `state: false`
    #[error("115 API rejected request (errno {errno}): {message}")]
    Rejected { errno: i64, message: String },

    /// Upstream throttling
    #[error("Rate limit exceeded on {endpoint}")]
    RateLimited { endpoint: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    #[error("Payload cipher error: {0}")]
    Cipher(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for 115 operations
pub type Result<T> = std::result::Result<T, U115Error>;

impl From<U115Error> for BridgeError {
    fn from(error: U115Error) -> Self {
        match error {
            U115Error::RateLimited { endpoint } => BridgeError::RateLimited(endpoint),
            U115Error::NotFound(what) => BridgeError::NotFound(what),
            U115Error::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

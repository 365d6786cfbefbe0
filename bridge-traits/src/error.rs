use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote rate limit hit: {0}")]
    RateLimited(String),

    #[error("Remote resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is an upstream throttling response
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BridgeError::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

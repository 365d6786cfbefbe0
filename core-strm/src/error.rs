use bridge_traits::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote drive error: {0}")]
    Provider(String),

    #[error("Remote rate limit hit: {0}")]
    RateLimited(String),

    #[error("Remote root not found: {path}")]
    RootNotFound { path: String },

    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: BridgeError,
    },
}

impl StrmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StrmError::RateLimited(_))
    }
}

impl From<BridgeError> for StrmError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::RateLimited(endpoint) => StrmError::RateLimited(endpoint),
            other => StrmError::Provider(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for StrmError {
    fn from(error: core_runtime::Error) -> Self {
        StrmError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StrmError>;

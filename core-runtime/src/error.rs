use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid mapping line {line}: {message}")]
    InvalidMapping { line: String, message: String },

    #[error("Settings store error: {0}")]
    Settings(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, Error>;

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedirectError {
    #[error("Missing pickcode parameter")]
    MissingPickcode,

    #[error("Bad pickcode: {pickcode} {file_name}")]
    BadPickcode { pickcode: String, file_name: String },

    #[error("Bad receive code: {0}")]
    BadReceiveCode(String),

    #[error("Bad file id: {0}")]
    BadFileId(String),

    #[error("Share {0} needs an id or a file_name")]
    MissingShareFile(String),

    #[error("{name} not found in share {share_code}")]
    NotFoundInShare { share_code: String, name: String },

    #[error("Invalid apikey")]
    Unauthorized,

    #[error("Remote drive error: {0}")]
    Remote(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, RedirectError>;

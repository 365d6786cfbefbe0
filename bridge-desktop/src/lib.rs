//! # Desktop Bridge Implementations
//!
//! Bridge implementations for desktop and NAS hosts.
//!
//! - [`ReqwestHttpClient`]: pooled client, no redirect following, retries
//!   server errors
//! - [`TokioFileSystem`]: pointer files on local disk or a mounted share
//! - [`SqliteSettingsStore`]: `strm.*` settings in one SQLite file
//!
//! ```ignore
//! let settings = SqliteSettingsStore::new("/config/strm-helper.db".into()).await?;
//! let http = ReqwestHttpClient::new();
//! let fs = TokioFileSystem::new();
//! ```

mod filesystem;
mod http;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;

//! Pointer-file I/O and the settings store

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::Result;

/// File operations the pointer writer needs
///
/// Publishing a pointer is "write a sibling, then rename over the target":
///
/// ```ignore
/// let staging = target.with_extension("tmp");
/// fs.write_file(&staging, Bytes::from(url)).await?;
/// fs.rename(&staging, target).await?;
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create `path` and any missing parents
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Create or truncate `path`
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Move `from` over `to`, replacing any existing file in one step
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;
}

/// Typed key-value settings
///
/// Holds the operator-facing configuration under `strm.*` keys:
///
/// ```ignore
/// store.set_string("strm.server_address", "http://nas:29876").await?;
/// store.set_bool("strm.enable_life_monitor", true).await?;
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// `Err` when the stored value is not a boolean
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// `Err` when the stored value is not an integer
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn list_keys(&self) -> Result<Vec<String>>;
}

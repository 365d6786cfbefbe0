//! `FileSystemAccess` on `tokio::fs`

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::FileSystemAccess};
use bytes::Bytes;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Local disk or a mounted network share.
///
/// `write_file` syncs before returning so that the following `rename`
/// publishes a complete pointer file.
#[derive(Debug, Default, Clone)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(path).await?))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;

        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        Ok(())
    }
}

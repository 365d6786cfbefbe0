//! # Pointer File Writer
//!
//! Emits `.strm` pointer files. A write is all-or-nothing: the content is
//! staged in a sibling temporary file and renamed over the target, so a reader
//! only ever sees a complete pointer or none at all. Concurrent writers racing
//! on the same path are safe; the last rename wins.

use bridge_traits::storage::FileSystemAccess;
use bridge_traits::BridgeError;
use bytes::Bytes;
use core_runtime::config::extension_of;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, StrmError};

/// Why a leaf did not produce a pointer file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Source extension is not in the media allow-list
    UnsupportedExtension,
    /// Remote node carries no download handle
    MissingPickcode,
    /// Download handle is not a 17-character alphanumeric token
    MalformedPickcode,
    /// File belongs to a disc-image bundle
    Bundle,
    /// No configured mapping covers the remote path
    OutsideMapping,
    /// Event came from a storage backend other than the remote drive
    ForeignStorage,
    /// Required configuration is missing
    NotConfigured,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::UnsupportedExtension => "unsupported extension",
            SkipReason::MissingPickcode => "missing pickcode",
            SkipReason::MalformedPickcode => "malformed pickcode",
            SkipReason::Bundle => "disc-image bundle",
            SkipReason::OutsideMapping => "outside every mapping",
            SkipReason::ForeignStorage => "foreign storage",
            SkipReason::NotConfigured => "not configured",
        };
        f.write_str(text)
    }
}

/// Result of one write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Pointer file was created (`created`) or overwritten
    Written { path: PathBuf, created: bool },
    /// Pointer file already held the same URL
    Unchanged { path: PathBuf },
    Skipped(SkipReason),
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            WriteOutcome::Written { path, .. } | WriteOutcome::Unchanged { path } => Some(path),
            WriteOutcome::Skipped(_) => None,
        }
    }
}

/// Writes pointer files for media leaves
pub struct StrmWriter {
    fs: Arc<dyn FileSystemAccess>,
    media_extensions: Vec<String>,
}

impl StrmWriter {
    /// Create a writer accepting the given extensions (lower-case, no dot)
    pub fn new(fs: Arc<dyn FileSystemAccess>, media_extensions: Vec<String>) -> Self {
        let media_extensions = media_extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            fs,
            media_extensions,
        }
    }

    /// True when `source_name` has an allowed media extension
    pub fn accepts(&self, source_name: &str) -> bool {
        extension_of(source_name)
            .map(|ext| self.media_extensions.contains(&ext))
            .unwrap_or(false)
    }

    /// Write `url` to `local_path` on behalf of the remote file `source_name`.
    ///
    /// Non-media sources are reported as [`SkipReason::UnsupportedExtension`];
    /// filesystem failures surface as [`StrmError::Io`].
    #[instrument(skip(self, url), fields(path = %local_path.display()))]
    pub async fn write(&self, source_name: &str, local_path: &Path, url: &str) -> Result<WriteOutcome> {
        if !self.accepts(source_name) {
            debug!("Skipping non-media file {}", source_name);
            return Ok(WriteOutcome::Skipped(SkipReason::UnsupportedExtension));
        }

        self.write_pointer(local_path, url).await
    }

    /// Publish `url` at `local_path` without an extension check
    pub async fn write_pointer(&self, local_path: &Path, url: &str) -> Result<WriteOutcome> {
        let io_error = |source: BridgeError| StrmError::Io {
            path: local_path.to_path_buf(),
            source,
        };

        let parent = local_path.parent().ok_or_else(|| StrmError::Io {
            path: local_path.to_path_buf(),
            source: BridgeError::OperationFailed(
                "pointer path has no parent directory".to_string(),
            ),
        })?;
        self.fs.create_dir_all(parent).await.map_err(io_error)?;

        let existed = self.fs.exists(local_path).await.map_err(io_error)?;
        if existed {
            match self.fs.read_file(local_path).await {
                Ok(current) if current.as_ref() == url.as_bytes() => {
                    debug!("STRM file already up to date: {}", local_path.display());
                    return Ok(WriteOutcome::Unchanged {
                        path: local_path.to_path_buf(),
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("Could not read existing STRM file, overwriting: {}", e),
            }
            info!("Updating STRM file: {}", local_path.display());
        } else {
            info!("Generating STRM file: {}", local_path.display());
        }

        let staging = staging_path(local_path);
        let published = match self
            .fs
            .write_file(&staging, Bytes::copy_from_slice(url.as_bytes()))
            .await
        {
            Ok(()) => self.fs.rename(&staging, local_path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = published {
            warn!("Failed to write STRM file {}: {}", local_path.display(), e);
            if let Err(cleanup) = self.fs.delete_file(&staging).await {
                debug!("No staging file to clean up: {}", cleanup);
            }
            return Err(io_error(e));
        }

        Ok(WriteOutcome::Written {
            path: local_path.to_path_buf(),
            created: !existed,
        })
    }
}

/// Hidden sibling used to stage a write before the rename
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use core_runtime::config::DEFAULT_MEDIA_EXTENSIONS;

    fn writer() -> StrmWriter {
        StrmWriter::new(
            Arc::new(TokioFileSystem::new()),
            DEFAULT_MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        )
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Show").join("Season 1").join("S01E01.strm");

        let outcome = writer()
            .write("S01E01.mkv", &target, "http://nas/redirect_url?pickcode=x")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WriteOutcome::Written {
                path: target.clone(),
                created: true
            }
        );
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "http://nas/redirect_url?pickcode=x"
        );
    }

    #[tokio::test]
    async fn test_rewrite_same_content_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.strm");
        let writer = writer();

        writer.write("a.mkv", &target, "http://u").await.unwrap();
        let second = writer.write("a.mkv", &target, "http://u").await.unwrap();

        assert!(matches!(second, WriteOutcome::Unchanged { .. }));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "http://u");
        assert_eq!(file_names(dir.path()), vec!["a.strm".to_string()]);
    }

    #[tokio::test]
    async fn test_rewrite_new_content_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.strm");
        let writer = writer();

        writer.write("a.mkv", &target, "http://old").await.unwrap();
        let outcome = writer.write("a.mkv", &target, "http://new").await.unwrap();

        assert_eq!(
            outcome,
            WriteOutcome::Written {
                path: target.clone(),
                created: false
            }
        );
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "http://new");
        assert_eq!(file_names(dir.path()), vec!["a.strm".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_leave_one_complete_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.strm");
        let writer = writer();
        let urls: Vec<String> = (0..16)
            .map(|i| format!("http://nas/redirect_url?pickcode={:0>17}", i))
            .collect();

        let results =
            futures::future::join_all(urls.iter().map(|url| writer.write_pointer(&target, url)))
                .await;

        assert!(results.iter().all(|result| result.is_ok()));
        let content = std::fs::read_to_string(&target).unwrap();
        assert!(urls.contains(&content), "torn pointer: {}", content);
        assert_eq!(file_names(dir.path()), vec!["a.strm".to_string()]);
    }

    #[tokio::test]
    async fn test_non_media_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("notes.strm");

        let outcome = writer().write("notes.txt", &target, "http://u").await.unwrap();

        assert_eq!(
            outcome,
            WriteOutcome::Skipped(SkipReason::UnsupportedExtension)
        );
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_extension_match_is_case_insensitive() {
        let writer = writer();
        assert!(writer.accepts("MOVIE.MKV"));
        assert!(writer.accepts("clip.M2TS"));
        assert!(!writer.accepts("subs.srt"));
        assert!(!writer.accepts("mkv"));
    }

    #[tokio::test]
    async fn test_write_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let target = blocker.join("a.strm");

        let err = writer().write("a.mkv", &target, "http://u").await.unwrap_err();

        assert!(matches!(err, StrmError::Io { .. }));
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staging = staging_path(Path::new("/strm/Show/a.strm"));
        assert_eq!(staging.parent(), Some(Path::new("/strm/Show")));

        let name = staging.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".a.strm."));
        assert!(name.ends_with(".tmp"));
    }
}

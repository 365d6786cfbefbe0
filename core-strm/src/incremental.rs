//! # Incremental Sync
//!
//! Reacts to one "transfer complete" notification at a time: a single file was
//! just placed on the remote drive by an upstream organizer. The handler maps
//! the file's remote directory to a local mirror, validates the pickcode and
//! writes one pointer file. A successful write is announced on the event bus
//! and, when a media server is configured, followed by a library refresh.
//!
//! The life monitor funnels its feed entries through [`IncrementalSyncHandler::sync_file`]
//! once it has rebuilt their remote directory path.

use bridge_traits::drive::Pickcode;
use bridge_traits::storage::FileSystemAccess;
use core_runtime::config::{normalize_remote_path, StrmConfig};
use core_runtime::events::{EventBus, StrmEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::mapping::{pointer_path_for, PathMapper};
use crate::pointer::PointerUrlBuilder;
use crate::refresh::LibraryRefresher;
use crate::writer::{SkipReason, StrmWriter, WriteOutcome};

/// Storage backend name of the remote drive in transfer notifications
pub const REMOTE_STORAGE: &str = "u115";

/// Directory names marking a Blu-ray disc structure
const BUNDLE_MARKERS: &[&str] = &["BDMV", "CERTIFICATE"];

/// A file that was just placed on a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Storage backend the file landed on
    pub storage: String,
    /// Remote directory holding the file
    pub target_dir: String,
    pub file_name: String,
    pub pickcode: Option<String>,
}

impl TransferEvent {
    /// Event for a file on the remote drive
    pub fn remote(target_dir: impl Into<String>, file_name: impl Into<String>, pickcode: Option<&str>) -> Self {
        Self {
            storage: REMOTE_STORAGE.to_string(),
            target_dir: target_dir.into(),
            file_name: file_name.into(),
            pickcode: pickcode.map(str::to_string),
        }
    }
}

/// True when `remote_dir` is part of a disc-image bundle
///
/// The directory counts as a bundle when it, or any ancestor, is named
/// `BDMV` or `CERTIFICATE` (case-insensitive).
pub fn is_bundle_dir(remote_dir: &str) -> bool {
    normalize_remote_path(remote_dir)
        .split('/')
        .any(|segment| {
            BUNDLE_MARKERS
                .iter()
                .any(|marker| segment.eq_ignore_ascii_case(marker))
        })
}

/// Writes pointer files for single, just-placed remote files
pub struct IncrementalSyncHandler {
    mapper: PathMapper,
    writer: Arc<StrmWriter>,
    urls: Option<PointerUrlBuilder>,
    refresher: Option<Arc<dyn LibraryRefresher>>,
    refresh_delay: Duration,
    event_bus: Option<EventBus>,
}

impl IncrementalSyncHandler {
    pub fn new(mapper: PathMapper, writer: Arc<StrmWriter>, urls: Option<PointerUrlBuilder>) -> Self {
        Self {
            mapper,
            writer,
            urls,
            refresher: None,
            refresh_delay: core_runtime::config::DEFAULT_REFRESH_DELAY,
            event_bus: None,
        }
    }

    /// Build a handler from configuration. Missing mappings or server address
    /// leave the handler inert rather than failing.
    pub fn from_config(fs: Arc<dyn FileSystemAccess>, config: &StrmConfig) -> Self {
        let writer = Arc::new(StrmWriter::new(fs, config.media_extensions.clone()));
        let urls = config
            .server_address
            .as_deref()
            .map(|address| PointerUrlBuilder::new(address, config.api_token.as_deref()));

        let mut handler = Self::new(PathMapper::new(config.mappings.clone()), writer, urls);
        handler.refresh_delay = config.refresh_delay;
        handler
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn LibraryRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Pause between a write and the library refresh
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Whether both mappings and a server address are present
    pub fn is_configured(&self) -> bool {
        !self.mapper.is_empty() && self.urls.is_some()
    }

    /// Handle one transfer notification
    #[instrument(skip(self, event), fields(file = %event.file_name))]
    pub async fn handle(&self, event: &TransferEvent) -> Result<WriteOutcome> {
        if event.storage != REMOTE_STORAGE {
            debug!("Ignoring transfer on storage {}", event.storage);
            return Ok(WriteOutcome::Skipped(SkipReason::ForeignStorage));
        }

        self.sync_file(&event.target_dir, &event.file_name, event.pickcode.as_deref())
            .await
    }

    /// Mirror one remote file given its directory, name and pickcode.
    ///
    /// Item-level problems come back as [`WriteOutcome::Skipped`]; only a
    /// failed filesystem write is an error.
    pub async fn sync_file(
        &self,
        remote_dir: &str,
        file_name: &str,
        pickcode: Option<&str>,
    ) -> Result<WriteOutcome> {
        let Some(urls) = self.urls.as_ref().filter(|_| !self.mapper.is_empty()) else {
            debug!("Incremental sync not configured, ignoring {}", file_name);
            return Ok(WriteOutcome::Skipped(SkipReason::NotConfigured));
        };

        if is_bundle_dir(remote_dir) {
            warn!(
                "{} belongs to a disc-image bundle, no STRM file generated: {}",
                file_name, remote_dir
            );
            return Ok(WriteOutcome::Skipped(SkipReason::Bundle));
        }

        let Some(mapping) = self.mapper.resolve(remote_dir) else {
            debug!("{} is outside every mapping, skipping", file_name);
            return Ok(WriteOutcome::Skipped(SkipReason::OutsideMapping));
        };

        let Some(raw) = pickcode.filter(|p| !p.is_empty()) else {
            error!("{} has no pickcode, cannot generate STRM file", file_name);
            return Ok(WriteOutcome::Skipped(SkipReason::MissingPickcode));
        };
        let Some(pickcode) = Pickcode::parse(raw) else {
            error!("{} has malformed pickcode {}, cannot generate STRM file", file_name, raw);
            return Ok(WriteOutcome::Skipped(SkipReason::MalformedPickcode));
        };

        let Some(local_path) = pointer_path_for(mapping, remote_dir, file_name) else {
            warn!("{} does not map to a local path under {}", file_name, mapping);
            return Ok(WriteOutcome::Skipped(SkipReason::OutsideMapping));
        };

        let outcome = self
            .writer
            .write(file_name, &local_path, &urls.private(&pickcode))
            .await?;

        if let WriteOutcome::Written { path, .. } = &outcome {
            info!("Generated STRM file for {}: {}", file_name, path.display());
            if let Some(bus) = &self.event_bus {
                bus.emit(StrmEvent::PointerWritten {
                    local_path: path.display().to_string(),
                })
                .ok();
            }
            self.refresh(path).await;
        }

        Ok(outcome)
    }

    async fn refresh(&self, path: &std::path::Path) {
        let Some(refresher) = &self.refresher else {
            return;
        };

        // network filesystems need a moment before the new file is visible
        tokio::time::sleep(self.refresh_delay).await;

        if let Err(e) = refresher.refresh(path).await {
            warn!("Library refresh for {} failed: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrmError;
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use core_runtime::config::{PathMapping, DEFAULT_MEDIA_EXTENSIONS};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRefresher {
        paths: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl LibraryRefresher for RecordingRefresher {
        async fn refresh(&self, local_path: &Path) -> Result<()> {
            self.paths.lock().unwrap().push(local_path.to_path_buf());
            if self.fail {
                return Err(StrmError::Provider("media server down".to_string()));
            }
            Ok(())
        }
    }

    fn handler(local_root: &Path) -> IncrementalSyncHandler {
        let writer = Arc::new(StrmWriter::new(
            Arc::new(TokioFileSystem::new()),
            DEFAULT_MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        ));
        IncrementalSyncHandler::new(
            PathMapper::new(vec![PathMapping::new(local_root, "/Pan/Media")]),
            writer,
            Some(PointerUrlBuilder::new("http://nas:29876", Some("token"))),
        )
    }

    #[tokio::test]
    async fn test_event_in_mapping_writes_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let event = TransferEvent::remote("/Pan/Media/Show", "S01E01.mkv", Some("abcdefghijklmno12"));

        let outcome = handler(dir.path()).handle(&event).await.unwrap();

        let expected = dir.path().join("Show").join("S01E01.strm");
        assert_eq!(outcome.path(), Some(expected.as_path()));
        assert_eq!(
            std::fs::read_to_string(expected).unwrap(),
            "http://nas:29876/redirect_url?apikey=token&pickcode=abcdefghijklmno12"
        );
    }

    #[tokio::test]
    async fn test_event_outside_mapping_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let event = TransferEvent::remote("/Pan/Other", "file.mkv", Some("abcdefghijklmno12"));

        let outcome = handler(dir.path()).handle(&event).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped(SkipReason::OutsideMapping));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_storage_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut event = TransferEvent::remote("/Pan/Media", "a.mkv", Some("abcdefghijklmno12"));
        event.storage = "local".to_string();

        let outcome = handler(dir.path()).handle(&event).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped(SkipReason::ForeignStorage));
    }

    #[tokio::test]
    async fn test_bundle_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let event = TransferEvent::remote(
            "/Pan/Media/Movie (2020)/BDMV/STREAM",
            "00001.m2ts",
            Some("abcdefghijklmno12"),
        );

        let outcome = handler(dir.path()).handle(&event).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped(SkipReason::Bundle));
    }

    #[tokio::test]
    async fn test_bad_pickcodes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let missing = TransferEvent::remote("/Pan/Media", "a.mkv", None);
        assert_eq!(
            handler.handle(&missing).await.unwrap(),
            WriteOutcome::Skipped(SkipReason::MissingPickcode)
        );

        let short = TransferEvent::remote("/Pan/Media", "a.mkv", Some("abcdefghijklmno1"));
        assert_eq!(
            handler.handle(&short).await.unwrap(),
            WriteOutcome::Skipped(SkipReason::MalformedPickcode)
        );
        assert!(!dir.path().join("a.strm").exists());
    }

    #[tokio::test]
    async fn test_unconfigured_handler_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(StrmWriter::new(
            Arc::new(TokioFileSystem::new()),
            vec!["mkv".to_string()],
        ));
        let handler = IncrementalSyncHandler::new(
            PathMapper::new(vec![PathMapping::new(dir.path(), "/Pan/Media")]),
            writer,
            None,
        );
        assert!(!handler.is_configured());

        let event = TransferEvent::remote("/Pan/Media", "a.mkv", Some("abcdefghijklmno12"));
        assert_eq!(
            handler.handle(&event).await.unwrap(),
            WriteOutcome::Skipped(SkipReason::NotConfigured)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_announces_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let refresher = Arc::new(RecordingRefresher::default());
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let handler = handler(dir.path())
            .with_refresher(refresher.clone())
            .with_refresh_delay(Duration::from_secs(2))
            .with_event_bus(bus);

        let event = TransferEvent::remote("/Pan/Media/Show", "S01E01.mkv", Some("abcdefghijklmno12"));
        let start = tokio::time::Instant::now();
        handler.handle(&event).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        let expected = dir.path().join("Show").join("S01E01.strm");
        assert_eq!(*refresher.paths.lock().unwrap(), vec![expected.clone()]);
        assert_eq!(
            events.recv().await.unwrap(),
            StrmEvent::PointerWritten {
                local_path: expected.display().to_string()
            }
        );

        // unchanged pointer: no second refresh
        handler.handle(&event).await.unwrap();
        assert_eq!(refresher.paths.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_does_not_fail_sync() {
        let dir = tempfile::tempdir().unwrap();
        let refresher = Arc::new(RecordingRefresher {
            fail: true,
            ..Default::default()
        });
        let handler = handler(dir.path()).with_refresher(refresher);

        let event = TransferEvent::remote("/Pan/Media", "a.mkv", Some("abcdefghijklmno12"));
        let outcome = handler.handle(&event).await.unwrap();

        assert!(outcome.is_written());
    }

    #[test]
    fn test_is_bundle_dir() {
        assert!(is_bundle_dir("/Pan/Media/Movie/BDMV"));
        assert!(is_bundle_dir("/Pan/Media/Movie/bdmv/STREAM"));
        assert!(is_bundle_dir("/Pan/Media/Movie/CERTIFICATE"));
        assert!(!is_bundle_dir("/Pan/Media/Movie"));
        assert!(!is_bundle_dir("/Pan/Media/BDMVx"));
    }
}

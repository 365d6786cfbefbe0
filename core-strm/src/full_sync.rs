//! # Full Sync
//!
//! Mirrors whole remote subtrees of the session's own drive. Each mapping's
//! remote root is resolved to an id, walked, and every media leaf with a valid
//! pickcode becomes a pointer file under the mapping's local root.
//!
//! A mapping whose root cannot be resolved is reported and skipped; the other
//! mappings still run.

use bridge_traits::drive::{Pickcode, RemoteDrive, RemoteNode};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::config::{PathMapping, StrmConfig};
use core_runtime::events::{EventBus, SyncKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::cooldown::Cooldown;
use crate::engine::{BatchRunner, SyncReport};
use crate::error::{Result, StrmError};
use crate::pointer::PointerUrlBuilder;
use crate::walker::{ListingScope, RemoteTreeWalker, DEFAULT_PAGE_SIZE};
use crate::writer::{SkipReason, StrmWriter};

/// Full sync engine for private drive trees
pub struct FullSyncEngine {
    drive: Arc<dyn RemoteDrive>,
    runner: BatchRunner,
    urls: PointerUrlBuilder,
    list_cooldown: Duration,
    page_size: u64,
}

impl FullSyncEngine {
    pub fn new(
        drive: Arc<dyn RemoteDrive>,
        writer: Arc<StrmWriter>,
        urls: PointerUrlBuilder,
        list_cooldown: Duration,
    ) -> Self {
        Self {
            drive,
            runner: BatchRunner::new(writer),
            urls,
            list_cooldown,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Build an engine from configuration.
    ///
    /// Fails with [`StrmError::Config`] when no server address is configured,
    /// since pointer URLs could not be formed.
    pub fn from_config(
        drive: Arc<dyn RemoteDrive>,
        fs: Arc<dyn FileSystemAccess>,
        config: &StrmConfig,
    ) -> Result<Self> {
        let address = config
            .server_address
            .as_deref()
            .ok_or_else(|| StrmError::Config("server address is not configured".to_string()))?;

        let writer = Arc::new(StrmWriter::new(fs, config.media_extensions.clone()));
        let urls = PointerUrlBuilder::new(address, config.api_token.as_deref());

        Ok(Self::new(drive, writer, urls, config.list_cooldown).with_workers(config.sync_workers))
    }

    /// Concurrent pointer writes per page
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.runner.set_workers(workers);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.runner.set_event_bus(event_bus);
        self
    }

    /// Retries and base backoff for throttled listing pages
    pub fn with_rate_limit_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.runner.set_rate_limit_retry(retries, backoff);
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Mirror every mapping in order
    #[instrument(skip(self, mappings), fields(mappings = mappings.len()))]
    pub async fn run(&self, mappings: &[PathMapping]) -> Result<SyncReport> {
        if mappings.is_empty() {
            return Err(StrmError::Config(
                "no full sync mappings configured".to_string(),
            ));
        }

        let mut state = self.runner.start(SyncKind::Full);
        let cooldown = Arc::new(Cooldown::new(self.list_cooldown));

        for mapping in mappings {
            let root_id = match self.drive.resolve_dir_id(&mapping.remote_root).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    let err = StrmError::RootNotFound {
                        path: mapping.remote_root.clone(),
                    };
                    state.fail_root(mapping.remote_root.clone(), err.to_string());
                    continue;
                }
                Err(e) => {
                    state.fail_root(mapping.remote_root.clone(), e.to_string());
                    continue;
                }
            };

            info!(
                "Mirroring {} (id {}) into {}",
                mapping.remote_root,
                root_id,
                mapping.local_root.display()
            );

            let mut walker = RemoteTreeWalker::new(
                self.drive.clone(),
                ListingScope::Private,
                cooldown.clone(),
                root_id,
                mapping.remote_root.clone(),
            )
            .with_page_size(self.page_size);

            self.runner
                .mirror(&mut state, &mut walker, mapping, |node| self.pointer_url(node))
                .await;
        }

        Ok(self.runner.finish(state, mappings.len()))
    }

    fn pointer_url(&self, node: &RemoteNode) -> std::result::Result<String, SkipReason> {
        let raw = node.pickcode.as_deref().ok_or(SkipReason::MissingPickcode)?;
        let pickcode = Pickcode::parse(raw).ok_or(SkipReason::MalformedPickcode)?;
        Ok(self.urls.private(&pickcode))
    }
}

//! # Share Sync
//!
//! Mirrors a publicly shared subtree. Listing goes through the share API and
//! every pointer URL carries the share credentials plus the file id, since
//! shared files have no pickcode usable by the session.

use bridge_traits::drive::{RemoteDrive, ShareContext};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::config::{PathMapping, ShareTarget, StrmConfig};
use core_runtime::events::{EventBus, SyncKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::cooldown::Cooldown;
use crate::engine::{BatchRunner, SyncReport};
use crate::error::{Result, StrmError};
use crate::pointer::PointerUrlBuilder;
use crate::walker::{ListingScope, RemoteTreeWalker, DEFAULT_PAGE_SIZE};
use crate::writer::StrmWriter;

/// Share sync engine
pub struct ShareSyncEngine {
    drive: Arc<dyn RemoteDrive>,
    runner: BatchRunner,
    urls: PointerUrlBuilder,
    list_cooldown: Duration,
    page_size: u64,
}

impl ShareSyncEngine {
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

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.runner.set_workers(workers);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.runner.set_event_bus(event_bus);
        self
    }

    pub fn with_rate_limit_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.runner.set_rate_limit_retry(retries, backoff);
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Mirror every share target in order
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn run(&self, targets: &[ShareTarget]) -> Result<SyncReport> {
        if targets.is_empty() {
            return Err(StrmError::Config("no share targets configured".to_string()));
        }

        let mut state = self.runner.start(SyncKind::Share);
        let cooldown = Arc::new(Cooldown::new(self.list_cooldown));

        for target in targets {
            let receive_code = match &target.receive_code {
                Some(code) => code.clone(),
                None => match self.drive.share_receive_code(&target.share_code).await {
                    Ok(code) => {
                        debug!("Fetched receive code for share {}", target.share_code);
                        code
                    }
                    Err(e) => {
                        state.fail_root(target.share_code.clone(), e.to_string());
                        continue;
                    }
                },
            };

            let share = ShareContext::new(target.share_code.clone(), receive_code);
            let mapping = PathMapping::new(target.local_root.clone(), "/");

            info!(
                "Mirroring share {} (cid {}) into {}",
                share.share_code,
                target.remote_cid,
                target.local_root.display()
            );

            let mut walker = RemoteTreeWalker::new(
                self.drive.clone(),
                ListingScope::Share(share.clone()),
                cooldown.clone(),
                target.remote_cid.clone(),
                "/",
            )
            .with_page_size(self.page_size);

            let urls = &self.urls;
            self.runner
                .mirror(&mut state, &mut walker, &mapping, |node| {
                    Ok(urls.share(&share, &node.id))
                })
                .await;
        }

        Ok(self.runner.finish(state, targets.len()))
    }
}

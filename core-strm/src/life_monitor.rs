//! # Life Event Monitor
//!
//! One background loop per service that polls the remote drive's activity
//! feed and mirrors newly uploaded or moved-in files as they appear.
//!
//! ## Behaviour
//!
//! - The feed watermark starts at the clock's current time, so history from
//!   before the monitor started is not replayed.
//! - Each poll asks for entries since `watermark - 1` and drops entries it has
//!   already handled, so entries sharing the watermark's second are neither
//!   lost nor processed twice.
//! - The feed reports only `parent_id` and a name; the directory path is
//!   rebuilt by walking parents upward, with an LRU cache of known paths.
//! - A feed error ends the loop. It is not restarted automatically.
//! - `stop` cancels cooperatively: an in-flight poll finishes first.

use bridge_traits::drive::{LifeEvent, LifeEventKind, RemoteDrive, ROOT_ID};
use bridge_traits::time::Clock;
use core_runtime::events::{EventBus, StrmEvent};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, StrmError};
use crate::incremental::IncrementalSyncHandler;
use crate::mapping::join_remote;
use crate::writer::WriteOutcome;

/// Remote directories whose full path is remembered between polls
const PARENT_CACHE_CAPACITY: usize = 512;

/// Deepest parent chain followed before giving up on an entry
const MAX_PARENT_DEPTH: usize = 64;

/// Reason reported when the loop exits through [`LifeEventMonitor::stop`]
pub const STOPPED_BY_REQUEST: &str = "stopped";

type SeenKey = (String, i64, i64);

/// Position in the activity feed plus per-loop caches
pub struct FeedCursor {
    watermark: i64,
    seen: HashSet<SeenKey>,
    parents: LruCache<String, String>,
}

impl FeedCursor {
    /// Cursor that only reports entries after `watermark` (unix seconds)
    pub fn starting_at(watermark: i64) -> Self {
        let capacity = NonZeroUsize::new(PARENT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            watermark,
            seen: HashSet::new(),
            parents: LruCache::new(capacity),
        }
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    /// Drop the cached path of `dir_id` and of every directory below it
    fn forget_dir(&mut self, dir_id: &str) {
        let Some(path) = self.parents.pop(dir_id) else {
            return;
        };
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let stale: Vec<String> = self
            .parents
            .iter()
            .filter(|(_, cached)| cached.starts_with(&prefix))
            .map(|(id, _)| id.clone())
            .collect();
        debug!("Forgetting cached path {} and {} below it", path, stale.len());
        for id in stale {
            self.parents.pop(&id);
        }
    }

    fn advance(&mut self, occurred_at: i64) {
        if occurred_at > self.watermark {
            self.watermark = occurred_at;
            let floor = self.watermark;
            self.seen.retain(|(_, _, at)| *at >= floor);
        }
    }
}

struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Polls the activity feed and hands relevant entries to the incremental handler
pub struct LifeEventMonitor {
    drive: Arc<dyn RemoteDrive>,
    handler: Arc<IncrementalSyncHandler>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    running: Mutex<Option<RunningLoop>>,
}

impl LifeEventMonitor {
    pub fn new(
        drive: Arc<dyn RemoteDrive>,
        handler: Arc<IncrementalSyncHandler>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            drive,
            handler,
            interval,
            clock,
            event_bus: None,
            running: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Whether a poll loop is currently alive
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Spawn the poll loop.
    ///
    /// Returns `false` without doing anything when a loop is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("Life monitor already running");
            return false;
        }

        let token = CancellationToken::new();
        let cursor = FeedCursor::starting_at(self.clock.unix_timestamp());
        info!(
            "Starting life monitor at watermark {} (every {:?})",
            cursor.watermark(),
            self.interval
        );
        self.emit(StrmEvent::MonitorStarted);

        let monitor = Arc::clone(self);
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            let reason = monitor.run(cursor, loop_token).await;
            monitor.emit(StrmEvent::MonitorStopped { reason });
        });

        *running = Some(RunningLoop { token, task });
        true
    }

    /// Ask the loop to stop and wait for it to exit.
    ///
    /// Returns `false` when no loop was running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(running) = running else {
            return false;
        };

        running.token.cancel();
        if let Err(e) = running.task.await {
            warn!("Life monitor task ended abnormally: {}", e);
        }
        true
    }

    async fn run(&self, mut cursor: FeedCursor, token: CancellationToken) -> String {
        loop {
            if token.is_cancelled() {
                break;
            }

            if let Err(e) = self.poll(&mut cursor).await {
                error!("Life monitor stopped after feed error: {}", e);
                return e.to_string();
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Life monitor stopped");
        STOPPED_BY_REQUEST.to_string()
    }

    /// Fetch one batch from the feed and mirror what it reports.
    ///
    /// Returns the number of pointer files written. Only a failed feed call is
    /// an error; problems with single entries are logged and skipped.
    #[instrument(skip(self, cursor), fields(watermark = cursor.watermark))]
    pub async fn poll(&self, cursor: &mut FeedCursor) -> Result<usize> {
        let events = self.drive.life_events(cursor.watermark - 1).await?;
        let mut written = 0;

        for event in events {
            let key = (event.file_id.clone(), event.type_code, event.occurred_at);
            if !cursor.seen.insert(key) {
                continue;
            }
            cursor.advance(event.occurred_at);

            // a moved or renamed folder invalidates every path cached through it
            if event.is_directory || event.kind == LifeEventKind::RenameInto {
                cursor.forget_dir(&event.file_id);
            }

            if !is_relevant(&event) {
                continue;
            }

            let remote_dir = match self.remote_dir_path(cursor, &event.parent_id).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(
                        "Cannot rebuild remote path of {} (parent {}): {}",
                        event.file_name, event.parent_id, e
                    );
                    continue;
                }
            };

            match self
                .handler
                .sync_file(&remote_dir, &event.file_name, event.pickcode.as_deref())
                .await
            {
                Ok(WriteOutcome::Written { .. }) => written += 1,
                Ok(_) => {}
                Err(e) => error!("Failed to mirror {}/{}: {}", remote_dir, event.file_name, e),
            }
        }

        if written > 0 {
            info!("Life monitor wrote {} STRM files", written);
        }
        Ok(written)
    }

    /// Rebuild the full remote path of `dir_id` by walking parents upward
    async fn remote_dir_path(&self, cursor: &mut FeedCursor, dir_id: &str) -> Result<String> {
        let mut chain: Vec<(String, String)> = Vec::new();
        let mut current = dir_id.to_string();

        let base = loop {
            if current.is_empty() || current == ROOT_ID {
                break "/".to_string();
            }
            if let Some(path) = cursor.parents.get(&current) {
                break path.clone();
            }
            if chain.len() >= MAX_PARENT_DEPTH {
                return Err(StrmError::Provider(format!(
                    "directory {} is nested deeper than {} levels",
                    dir_id, MAX_PARENT_DEPTH
                )));
            }

            let node = self.drive.get_directory(&current).await?;
            let parent = node.parent_id;
            chain.push((current, node.name));
            current = parent;
        };

        let mut path = base;
        for (id, name) in chain.into_iter().rev() {
            path = join_remote(&path, &name);
            cursor.parents.put(id, path.clone());
        }
        Ok(path)
    }

    fn emit(&self, event: StrmEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}

fn is_relevant(event: &LifeEvent) -> bool {
    if event.is_directory {
        debug!("Ignoring directory entry {}", event.file_name);
        return false;
    }
    match event.kind {
        LifeEventKind::Upload | LifeEventKind::RenameInto => true,
        LifeEventKind::Other => {
            debug!("Ignoring feed entry type {} for {}", event.type_code, event.file_name);
            false
        }
    }
}

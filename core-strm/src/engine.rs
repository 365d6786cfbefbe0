//! Batch machinery shared by the full and share sync engines
//!
//! A run drains one [`RemoteTreeWalker`] per root. Leaves of each page are
//! written concurrently, bounded by the worker count; listing calls stay
//! serialized behind the walker's cooldown. Per-item failures are counted and
//! logged, never propagated.

use bridge_traits::drive::RemoteNode;
use core_runtime::config::PathMapping;
use core_runtime::events::{EventBus, StrmEvent, SyncKind, SyncSummary};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::mapping::pointer_path_for;
use crate::walker::{RemoteTreeWalker, WalkEntry};
use crate::writer::{SkipReason, StrmWriter, WriteOutcome};

/// Retries of a throttled page before the directory is given up
pub const DEFAULT_RATE_LIMIT_RETRIES: u32 = 3;

/// Base wait after a throttled page; grows linearly with each retry
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

/// A root that could not be synced at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootFailure {
    /// Remote root path or share code
    pub root: String,
    pub message: String,
}

/// Outcome of a full or share sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    pub kind: SyncKind,
    pub summary: SyncSummary,
    pub root_failures: Vec<RootFailure>,
}

impl SyncReport {
    /// Pointer files created or overwritten
    pub fn written(&self) -> u64 {
        self.summary.written
    }

    pub fn is_clean(&self) -> bool {
        self.summary.failed == 0 && self.root_failures.is_empty()
    }
}

/// Drives walkers to completion and writes their leaves
pub(crate) struct BatchRunner {
    writer: Arc<StrmWriter>,
    workers: usize,
    event_bus: Option<EventBus>,
    rate_limit_retries: u32,
    rate_limit_backoff: Duration,
}

impl BatchRunner {
    pub(crate) fn new(writer: Arc<StrmWriter>) -> Self {
        Self {
            writer,
            workers: 1,
            event_bus: None,
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub(crate) fn set_workers(&mut self, workers: usize) {
        self.workers = workers.max(1);
    }

    pub(crate) fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    pub(crate) fn set_rate_limit_retry(&mut self, retries: u32, backoff: Duration) {
        self.rate_limit_retries = retries;
        self.rate_limit_backoff = backoff;
    }

    pub(crate) fn emit(&self, event: StrmEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }

    /// Begin a run: allocate an id and announce it
    pub(crate) fn start(&self, kind: SyncKind) -> RunState {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, "Starting {} sync", kind);
        self.emit(StrmEvent::SyncStarted {
            run_id: run_id.clone(),
            kind,
        });

        RunState {
            run_id,
            kind,
            started: Instant::now(),
            summary: SyncSummary::default(),
            root_failures: Vec::new(),
        }
    }

    /// Close a run and publish the final counters
    pub(crate) fn finish(&self, mut state: RunState, roots: usize) -> SyncReport {
        state.summary.duration_ms = state.started.elapsed().as_millis() as u64;

        if roots > 0 && state.root_failures.len() == roots {
            self.emit(StrmEvent::SyncFailed {
                run_id: state.run_id.clone(),
                message: format!("none of the {} roots could be synced", roots),
            });
        }

        let summary = state.summary;
        info!(
            run_id = %state.run_id,
            "{} sync finished: {} written, {} unchanged, {} skipped, {} failed in {}ms",
            state.kind,
            summary.written,
            summary.unchanged,
            summary.skipped,
            summary.failed,
            summary.duration_ms
        );
        self.emit(StrmEvent::SyncCompleted {
            run_id: state.run_id.clone(),
            summary,
        });

        SyncReport {
            run_id: state.run_id,
            kind: state.kind,
            summary,
            root_failures: state.root_failures,
        }
    }

    /// Walk one root and mirror every media leaf under `mapping`
    pub(crate) async fn mirror<F>(
        &self,
        state: &mut RunState,
        walker: &mut RemoteTreeWalker,
        mapping: &PathMapping,
        url_for: F,
    ) where
        F: Fn(&RemoteNode) -> std::result::Result<String, SkipReason>,
    {
        let mut throttled = 0u32;

        loop {
            match walker.next_batch().await {
                Ok(None) => break,
                Ok(Some(batch)) => {
                    throttled = 0;
                    self.write_batch(state, mapping, batch, &url_for).await;
                    self.emit(StrmEvent::SyncProgress {
                        run_id: state.run_id.clone(),
                        written: state.summary.written,
                        skipped: state.summary.skipped,
                        failed: state.summary.failed,
                    });
                }
                Err(e) if e.is_rate_limited() && throttled < self.rate_limit_retries => {
                    throttled += 1;
                    let wait = self.rate_limit_backoff * throttled;
                    warn!(
                        "Listing {} throttled, retry {}/{} in {:?}",
                        walker.current_dir().unwrap_or("?"),
                        throttled,
                        self.rate_limit_retries,
                        wait
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    throttled = 0;
                    let dir = walker.skip_current().unwrap_or_default();
                    error!("Giving up on remote directory {}: {}", dir, e);
                    state.summary.failed += 1;
                }
            }
        }
    }

    async fn write_batch<F>(
        &self,
        state: &mut RunState,
        mapping: &PathMapping,
        batch: Vec<WalkEntry>,
        url_for: &F,
    ) where
        F: Fn(&RemoteNode) -> std::result::Result<String, SkipReason>,
    {
        let writer = &self.writer;

        let outcomes: Vec<(String, Result<WriteOutcome>)> = stream::iter(batch)
            .map(|entry| async move {
                let remote_path = entry.remote_path();
                let outcome = write_leaf(writer, mapping, &entry, url_for).await;
                (remote_path, outcome)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for (remote_path, outcome) in outcomes {
            match outcome {
                Ok(WriteOutcome::Written { .. }) => state.summary.written += 1,
                Ok(WriteOutcome::Unchanged { .. }) => state.summary.unchanged += 1,
                Ok(WriteOutcome::Skipped(reason)) => {
                    state.summary.skipped += 1;
                    match reason {
                        SkipReason::UnsupportedExtension => {
                            debug!("Skipped {}: {}", remote_path, reason)
                        }
                        _ => warn!("Skipped {}: {}", remote_path, reason),
                    }
                }
                Err(e) => {
                    state.summary.failed += 1;
                    error!("Failed to mirror {}: {}", remote_path, e);
                }
            }
        }
    }
}

async fn write_leaf<F>(
    writer: &StrmWriter,
    mapping: &PathMapping,
    entry: &WalkEntry,
    url_for: &F,
) -> Result<WriteOutcome>
where
    F: Fn(&RemoteNode) -> std::result::Result<String, SkipReason>,
{
    if !writer.accepts(&entry.node.name) {
        return Ok(WriteOutcome::Skipped(SkipReason::UnsupportedExtension));
    }

    let Some(local_path) = pointer_path_for(mapping, &entry.remote_dir, &entry.node.name) else {
        return Ok(WriteOutcome::Skipped(SkipReason::OutsideMapping));
    };

    match url_for(&entry.node) {
        Ok(url) => writer.write_pointer(&local_path, &url).await,
        Err(reason) => Ok(WriteOutcome::Skipped(reason)),
    }
}

/// Mutable counters of one run
pub(crate) struct RunState {
    pub(crate) run_id: String,
    kind: SyncKind,
    started: Instant,
    pub(crate) summary: SyncSummary,
    pub(crate) root_failures: Vec<RootFailure>,
}

impl RunState {
    /// Record a root that could not be synced
    pub(crate) fn fail_root(&mut self, root: impl Into<String>, message: impl Into<String>) {
        let failure = RootFailure {
            root: root.into(),
            message: message.into(),
        };
        error!("Cannot sync {}: {}", failure.root, failure.message);
        self.summary.failed += 1;
        self.root_failures.push(failure);
    }
}

//! # Core STRM Module
//!
//! Mirrors media files from the remote drive as local `.strm` pointer files.
//!
//! ## Overview
//!
//! Each pointer file holds a single URL to the redirect endpoint. Media
//! players open the pointer, hit the endpoint and get redirected to a freshly
//! signed download URL. This crate produces the pointers:
//!
//! - [`FullSyncEngine`]: walks configured remote roots of the session's drive
//! - [`ShareSyncEngine`]: walks a publicly shared subtree
//! - [`IncrementalSyncHandler`]: mirrors one file per transfer notification
//! - [`LifeEventMonitor`]: polls the activity feed and mirrors new uploads
//!
//! All of them funnel into [`StrmWriter`], which writes atomically and skips
//! files whose extension is not in the media allow-list.
//!
//! ## Usage
//!
//! ```ignore
//! use core_strm::FullSyncEngine;
//!
//! let engine = FullSyncEngine::from_config(drive, fs, &config)?;
//! let report = engine.run(&config.full_sync_mappings).await?;
//! println!("{} pointer files written", report.written());
//! ```

pub mod cooldown;
pub mod engine;
pub mod error;
pub mod full_sync;
pub mod incremental;
pub mod life_monitor;
pub mod mapping;
pub mod pointer;
pub mod refresh;
pub mod share_sync;
pub mod walker;
pub mod writer;

#[cfg(test)]
mod testing;

pub use cooldown::Cooldown;
pub use engine::{RootFailure, SyncReport};
pub use error::{Result, StrmError};
pub use full_sync::FullSyncEngine;
pub use incremental::{IncrementalSyncHandler, TransferEvent, REMOTE_STORAGE};
pub use life_monitor::{FeedCursor, LifeEventMonitor};
pub use mapping::PathMapper;
pub use pointer::PointerUrlBuilder;
pub use refresh::{EmbyRefresher, LibraryRefresher};
pub use share_sync::ShareSyncEngine;
pub use walker::{ListingScope, RemoteTreeWalker, WalkEntry};
pub use writer::{SkipReason, StrmWriter, WriteOutcome};

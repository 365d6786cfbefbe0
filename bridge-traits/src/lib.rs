//! # Host Bridge Traits
//!
//! Capability traits the STRM core consumes without knowing how they are provided.
//!
//! ## Overview
//!
//! This crate defines the contract between the core crates and their collaborators.
//! Each trait represents a capability that the core requires but that is
//! implemented elsewhere (a desktop bridge, a remote-drive connector, a test fake).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for pointer files
//! - [`RemoteDrive`](drive::RemoteDrive) - Listing, path resolution, signed URLs, activity feed
//!
//! ### Configuration
//! - [`SettingsStore`](storage::SettingsStore) - Key-value settings storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Every trait returns [`BridgeError`](error::BridgeError). Throttling must
//! surface as `BridgeError::RateLimited` so the sync engines can back off,
//! and a missing remote object as `BridgeError::NotFound`.
//!
//! All traits are `Send + Sync`; engines share one handle across tasks.

pub mod drive;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use drive::{
    ChildPage, DownloadTarget, LifeEvent, LifeEventKind, Pickcode, RemoteDrive, RemoteNode,
    ShareContext,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileSystemAccess, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};

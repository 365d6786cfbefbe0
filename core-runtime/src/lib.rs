//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the STRM helper:
//! - Logging and tracing infrastructure
//! - Configuration management (`StrmConfig`, mapping syntax, settings keys)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync engines, the redirect
//! service and the host binary depend on. It establishes the logging conventions,
//! the configuration model and the event broadcasting mechanism used throughout
//! the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{MediaServerConfig, PathMapping, ShareTarget, StrmConfig, StrmConfigBuilder};
pub use error::{Error, Result};
pub use events::{EventBus, StrmEvent, SyncKind, SyncSummary};

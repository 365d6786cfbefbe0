//! # 115 Drive Provider
//!
//! Implements the `RemoteDrive` trait against the 115 cloud-drive web APIs.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated directory listing and path-to-id resolution
//! - Signed download URLs by pickcode, with per-app endpoint variants
//! - Share-link listing, search and download URLs
//! - The account activity ("life") feed
//!
//! The encrypted app endpoints need a [`PayloadCipher`]; without one the
//! connector uses the plain web download endpoint.

pub mod cipher;
pub mod connector;
pub mod error;
pub mod types;

pub use cipher::PayloadCipher;
pub use connector::{app_from_cookie, DownloadEndpoint, U115Connector};
pub use error::{Result, U115Error};

//! # Core Redirect Module
//!
//! The HTTP side of the STRM helper. Pointer files written by `core-strm`
//! address `GET /redirect_url`; this crate validates those requests,
//! exchanges them for signed download URLs on the remote drive and answers
//! with a `302` redirect.
//!
//! - [`RedirectResolver`]: validation, remote lookup, short-lived caching
//! - [`TtlCache`]: bounded LRU cache with clock-driven expiry
//! - [`router`] / [`serve`]: the axum endpoint

pub mod cache;
pub mod error;
pub mod resolver;
pub mod server;

#[cfg(test)]
mod testing;

pub use cache::TtlCache;
pub use error::{RedirectError, Result};
pub use resolver::{RedirectQuery, RedirectRequest, RedirectResolver, RedirectTarget, ShareFile};
pub use server::{router, serve, RedirectState};

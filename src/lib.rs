//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-redirect`). Host applications
//! can depend on `strm-workspace` and enable the documented features without
//! needing to wire each crate individually.

#[cfg(feature = "service")]
pub use core_service as service;

#[cfg(feature = "redirect-only")]
pub use core_redirect as redirect;

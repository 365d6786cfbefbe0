//! # STRM Configuration Module
//!
//! Provides configuration management for the STRM helper.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a [`StrmConfig`]
//! instance that holds every setting the sync engines and the redirect service
//! consume. It enforces fail-fast validation of what *is* configured (mapping
//! syntax, intervals, worker counts), while leaving optional pieces absent so
//! that the operations depending on them can degrade to a logged no-op.
//!
//! ## Mapping syntax
//!
//! Directory mappings are newline-separated `local_root#remote_root` pairs:
//!
//! ```text
//! /strm/movies#/Pan/Media/Movies
//! /strm/shows#/Pan/Media/Shows
//! ```
//!
//! Share targets use `local_root#share_code#receive_code#remote_cid`, where the
//! receive code may be empty (looked up remotely) and the cid defaults to `0`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::StrmConfig;
//!
//! let config = StrmConfig::builder()
//!     .mappings("/strm#/Pan/Media")
//!     .server_address("http://nas:29876")
//!     .api_token("secret")
//!     .build()?;
//! ```
//!
//! Or load it from a [`SettingsStore`]:
//!
//! ```ignore
//! let config = StrmConfig::from_settings(settings.as_ref()).await?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::storage::SettingsStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Media extensions mirrored when nothing else is configured
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "ts", "iso", "rmvb", "avi", "mov", "mpeg", "mpg", "wmv", "3gp", "asf", "m4v",
    "flv", "m2ts", "tp", "f4v",
];

pub const DEFAULT_LIST_COOLDOWN: Duration = Duration::from_secs(2);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REDIRECT_CACHE_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_REDIRECT_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:29876";

/// Path of the redirect endpoint relative to the server address
pub const REDIRECT_PATH: &str = "/redirect_url";

const MAX_LIST_COOLDOWN: Duration = Duration::from_secs(60);
const MIN_MONITOR_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SYNC_WORKERS: usize = 16;

/// Setting keys read by [`StrmConfig::from_settings`]
pub mod keys {
    pub const MAPPINGS: &str = "strm.mappings";
    pub const FULL_SYNC_MAPPINGS: &str = "strm.full_sync_mappings";
    pub const SHARE_TARGETS: &str = "strm.share_targets";
    pub const SERVER_ADDRESS: &str = "strm.server_address";
    pub const API_TOKEN: &str = "strm.api_token";
    pub const COOKIE: &str = "strm.cookie";
    pub const MEDIA_EXTENSIONS: &str = "strm.media_extensions";
    pub const LIST_COOLDOWN_MS: &str = "strm.list_cooldown_ms";
    pub const MONITOR_INTERVAL_MS: &str = "strm.monitor_interval_ms";
    pub const REDIRECT_CACHE_TTL_MS: &str = "strm.redirect_cache_ttl_ms";
    pub const REDIRECT_CACHE_CAPACITY: &str = "strm.redirect_cache_capacity";
    pub const REDIRECT_STRICT_STATUS: &str = "strm.redirect_strict_status";
    pub const REFRESH_DELAY_MS: &str = "strm.refresh_delay_ms";
    pub const SYNC_WORKERS: &str = "strm.sync_workers";
    pub const MEDIA_SERVER_URL: &str = "strm.media_server_url";
    pub const MEDIA_SERVER_API_KEY: &str = "strm.media_server_api_key";
    pub const BIND_ADDRESS: &str = "strm.bind_address";
    pub const ENABLE_LIFE_MONITOR: &str = "strm.enable_life_monitor";
    pub const ENABLE_INCREMENTAL: &str = "strm.enable_incremental";

    /// Storage type of a setting
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SettingKind {
        Text,
        Flag,
        Number,
    }

    /// `None` for keys the helper does not read
    pub fn kind_of(key: &str) -> Option<SettingKind> {
        match key {
            MAPPINGS | FULL_SYNC_MAPPINGS | SHARE_TARGETS | SERVER_ADDRESS | API_TOKEN
            | COOKIE | MEDIA_EXTENSIONS | MEDIA_SERVER_URL | MEDIA_SERVER_API_KEY
            | BIND_ADDRESS => Some(SettingKind::Text),
            REDIRECT_STRICT_STATUS | ENABLE_LIFE_MONITOR | ENABLE_INCREMENTAL => {
                Some(SettingKind::Flag)
            }
            LIST_COOLDOWN_MS | MONITOR_INTERVAL_MS | REDIRECT_CACHE_TTL_MS
            | REDIRECT_CACHE_CAPACITY | REFRESH_DELAY_MS | SYNC_WORKERS => {
                Some(SettingKind::Number)
            }
            _ => None,
        }
    }
}

/// Parse `raw` according to the key's type and store it.
///
/// Used by the command line so `strm.enable_life_monitor true` lands as a
/// boolean and `strm.list_cooldown_ms 2000` as an integer.
pub async fn store_setting(store: &dyn SettingsStore, key: &str, raw: &str) -> Result<()> {
    let kind = keys::kind_of(key)
        .ok_or_else(|| Error::Config(format!("Unknown setting: {}", key)))?;

    match kind {
        keys::SettingKind::Text => store.set_string(key, raw).await?,
        keys::SettingKind::Flag => {
            let value = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                other => {
                    return Err(Error::Config(format!(
                        "{} expects true or false, got '{}'",
                        key, other
                    )))
                }
            };
            store.set_bool(key, value).await?
        }
        keys::SettingKind::Number => {
            let value = raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("{} expects an integer, got '{}'", key, raw))
            })?;
            store.set_i64(key, value).await?
        }
    }

    Ok(())
}

/// One `local_root#remote_root` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Directory pointer files are written under
    pub local_root: PathBuf,
    /// Remote directory path, always absolute and without a trailing slash
    pub remote_root: String,
}

impl PathMapping {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: normalize_remote_path(remote_root),
        }
    }

    /// Parse a single `local_root#remote_root` line
    pub fn parse_line(line: &str) -> Result<Self> {
        let (local, remote) = line.split_once('#').ok_or_else(|| Error::InvalidMapping {
            line: line.to_string(),
            message: "expected local_root#remote_root".to_string(),
        })?;

        let local = local.trim();
        let remote = remote.trim();

        if local.is_empty() || remote.is_empty() {
            return Err(Error::InvalidMapping {
                line: line.to_string(),
                message: "both roots must be non-empty".to_string(),
            });
        }

        if remote.contains('#') {
            return Err(Error::InvalidMapping {
                line: line.to_string(),
                message: "remote root must not contain '#'".to_string(),
            });
        }

        Ok(Self::new(local, remote))
    }

    /// Parse a newline-separated mapping blob. Blank lines are ignored; order is kept.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::parse_line)
            .collect()
    }
}

impl fmt::Display for PathMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.local_root.display(), self.remote_root)
    }
}

/// A publicly shared subtree mirrored by the share sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTarget {
    pub local_root: PathBuf,
    pub share_code: String,
    /// `None` when the receive code should be looked up remotely
    pub receive_code: Option<String>,
    /// Directory inside the share to start from
    pub remote_cid: String,
}

impl ShareTarget {
    /// Parse a single `local_root#share_code#receive_code#remote_cid` line
    pub fn parse_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('#').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(Error::InvalidMapping {
                line: line.to_string(),
                message: "expected local_root#share_code[#receive_code[#remote_cid]]".to_string(),
            });
        }

        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::InvalidMapping {
                line: line.to_string(),
                message: "local root and share code must be non-empty".to_string(),
            });
        }

        let receive_code = parts
            .get(2)
            .filter(|code| !code.is_empty())
            .map(|code| code.to_string());
        let remote_cid = parts
            .get(3)
            .filter(|cid| !cid.is_empty())
            .map(|cid| cid.to_string())
            .unwrap_or_else(|| bridge_traits::drive::ROOT_ID.to_string());

        Ok(Self {
            local_root: PathBuf::from(parts[0]),
            share_code: parts[1].to_string(),
            receive_code,
            remote_cid,
        })
    }

    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::parse_line)
            .collect()
    }
}

/// Downstream media server notified after incremental writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaServerConfig {
    /// e.g. `http://emby:8096`
    pub base_url: String,
    pub api_key: String,
}

/// Everything the STRM engines and the redirect service read at runtime.
///
/// Optional fields are `None` when not configured; the operation that needs
/// them logs and returns without doing anything.
#[derive(Clone)]
pub struct StrmConfig {
    /// Mappings used by the incremental handler and the life monitor
    pub mappings: Vec<PathMapping>,
    /// Mappings walked by the full sync
    pub full_sync_mappings: Vec<PathMapping>,
    pub share_targets: Vec<ShareTarget>,
    /// Base URL of this service as seen by media players
    pub server_address: Option<String>,
    /// Embedded as `apikey=` in pointer URLs and checked by the redirect endpoint
    pub api_token: Option<String>,
    /// Remote session cookie
    pub cookie: Option<String>,
    /// Lower-case, without leading dot
    pub media_extensions: Vec<String>,
    pub list_cooldown: Duration,
    pub monitor_interval: Duration,
    pub redirect_cache_ttl: Duration,
    pub redirect_cache_capacity: usize,
    /// Answer redirect failures with 400/502 instead of 200
    pub redirect_strict_status: bool,
    pub refresh_delay: Duration,
    /// Concurrent pointer writes per listing page; directories are still walked one at a time
    pub sync_workers: usize,
    pub media_server: Option<MediaServerConfig>,
    pub bind_address: SocketAddr,
    pub enable_life_monitor: bool,
    pub enable_incremental: bool,
}

impl fmt::Debug for StrmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrmConfig")
            .field("mappings", &self.mappings)
            .field("full_sync_mappings", &self.full_sync_mappings)
            .field("share_targets", &self.share_targets.len())
            .field("server_address", &self.server_address)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("cookie", &self.cookie.as_ref().map(|_| "[REDACTED]"))
            .field("media_extensions", &self.media_extensions)
            .field("list_cooldown", &self.list_cooldown)
            .field("monitor_interval", &self.monitor_interval)
            .field("redirect_cache_ttl", &self.redirect_cache_ttl)
            .field("redirect_cache_capacity", &self.redirect_cache_capacity)
            .field("redirect_strict_status", &self.redirect_strict_status)
            .field("refresh_delay", &self.refresh_delay)
            .field("sync_workers", &self.sync_workers)
            .field("media_server", &self.media_server.as_ref().map(|m| &m.base_url))
            .field("bind_address", &self.bind_address)
            .field("enable_life_monitor", &self.enable_life_monitor)
            .field("enable_incremental", &self.enable_incremental)
            .finish()
    }
}

impl StrmConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> StrmConfigBuilder {
        StrmConfigBuilder::default()
    }

    /// Loads the configuration from a settings store.
    ///
    /// Missing keys fall back to defaults; malformed values are errors.
    pub async fn from_settings(store: &dyn SettingsStore) -> Result<Self> {
        let mut builder = StrmConfig::builder();

        if let Some(raw) = store.get_string(keys::MAPPINGS).await? {
            builder = builder.mappings(raw);
        }
        if let Some(raw) = store.get_string(keys::FULL_SYNC_MAPPINGS).await? {
            builder = builder.full_sync_mappings(raw);
        }
        if let Some(raw) = store.get_string(keys::SHARE_TARGETS).await? {
            builder = builder.share_targets(raw);
        }
        if let Some(address) = store.get_string(keys::SERVER_ADDRESS).await? {
            builder = builder.server_address(address);
        }
        if let Some(token) = store.get_string(keys::API_TOKEN).await? {
            builder = builder.api_token(token);
        }
        if let Some(cookie) = store.get_string(keys::COOKIE).await? {
            builder = builder.cookie(cookie);
        }
        if let Some(raw) = store.get_string(keys::MEDIA_EXTENSIONS).await? {
            builder = builder.media_extensions(parse_extension_list(&raw));
        }
        if let Some(ms) = store.get_i64(keys::LIST_COOLDOWN_MS).await? {
            builder = builder.list_cooldown(millis(keys::LIST_COOLDOWN_MS, ms)?);
        }
        if let Some(ms) = store.get_i64(keys::MONITOR_INTERVAL_MS).await? {
            builder = builder.monitor_interval(millis(keys::MONITOR_INTERVAL_MS, ms)?);
        }
        if let Some(ms) = store.get_i64(keys::REDIRECT_CACHE_TTL_MS).await? {
            builder = builder.redirect_cache_ttl(millis(keys::REDIRECT_CACHE_TTL_MS, ms)?);
        }
        if let Some(capacity) = store.get_i64(keys::REDIRECT_CACHE_CAPACITY).await? {
            builder = builder
                .redirect_cache_capacity(count(keys::REDIRECT_CACHE_CAPACITY, capacity)?);
        }
        if let Some(strict) = store.get_bool(keys::REDIRECT_STRICT_STATUS).await? {
            builder = builder.redirect_strict_status(strict);
        }
        if let Some(ms) = store.get_i64(keys::REFRESH_DELAY_MS).await? {
            builder = builder.refresh_delay(millis(keys::REFRESH_DELAY_MS, ms)?);
        }
        if let Some(workers) = store.get_i64(keys::SYNC_WORKERS).await? {
            builder = builder.sync_workers(count(keys::SYNC_WORKERS, workers)?);
        }
        if let Some(base_url) = store.get_string(keys::MEDIA_SERVER_URL).await? {
            let api_key = store
                .get_string(keys::MEDIA_SERVER_API_KEY)
                .await?
                .unwrap_or_default();
            builder = builder.media_server(MediaServerConfig { base_url, api_key });
        }
        if let Some(bind) = store.get_string(keys::BIND_ADDRESS).await? {
            builder = builder.bind_address(bind);
        }
        if let Some(enabled) = store.get_bool(keys::ENABLE_LIFE_MONITOR).await? {
            builder = builder.enable_life_monitor(enabled);
        }
        if let Some(enabled) = store.get_bool(keys::ENABLE_INCREMENTAL).await? {
            builder = builder.enable_incremental(enabled);
        }

        builder.build()
    }

    /// True when `file_name`'s extension is in the allow-list (case-insensitive)
    pub fn is_media_file(&self, file_name: &str) -> bool {
        match extension_of(file_name) {
            Some(ext) => self.media_extensions.iter().any(|allowed| *allowed == ext),
            None => false,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(address) = &self.server_address {
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "Server address must be an http(s) URL, got '{}'",
                    address
                )));
            }
        }

        if self.media_extensions.is_empty() {
            return Err(Error::Config(
                "At least one media extension must be configured".to_string(),
            ));
        }

        if self.list_cooldown > MAX_LIST_COOLDOWN {
            return Err(Error::Config(format!(
                "List cooldown must be at most {}s",
                MAX_LIST_COOLDOWN.as_secs()
            )));
        }

        if self.monitor_interval < MIN_MONITOR_INTERVAL {
            return Err(Error::Config(
                "Monitor interval must be at least 1s".to_string(),
            ));
        }

        if self.redirect_cache_capacity == 0 {
            return Err(Error::Config(
                "Redirect cache capacity must be greater than 0".to_string(),
            ));
        }

        if self.sync_workers == 0 || self.sync_workers > MAX_SYNC_WORKERS {
            return Err(Error::Config(format!(
                "Sync workers must be between 1 and {}",
                MAX_SYNC_WORKERS
            )));
        }

        if let Some(server) = &self.media_server {
            if server.base_url.trim().is_empty() {
                return Err(Error::Config(
                    "Media server URL must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for constructing [`StrmConfig`] instances.
///
/// Raw mapping strings are parsed in [`build()`](StrmConfigBuilder::build), so
/// a malformed line surfaces as a single configuration error.
#[derive(Default)]
pub struct StrmConfigBuilder {
    mappings: Option<String>,
    full_sync_mappings: Option<String>,
    share_targets: Option<String>,
    server_address: Option<String>,
    api_token: Option<String>,
    cookie: Option<String>,
    media_extensions: Option<Vec<String>>,
    list_cooldown: Option<Duration>,
    monitor_interval: Option<Duration>,
    redirect_cache_ttl: Option<Duration>,
    redirect_cache_capacity: Option<usize>,
    redirect_strict_status: bool,
    refresh_delay: Option<Duration>,
    sync_workers: Option<usize>,
    media_server: Option<MediaServerConfig>,
    bind_address: Option<String>,
    enable_life_monitor: Option<bool>,
    enable_incremental: Option<bool>,
}

impl StrmConfigBuilder {
    /// Sets the incremental / monitor mappings.
    ///
    /// # Arguments
    ///
    /// * `raw` - Newline-separated `local_root#remote_root` pairs
    pub fn mappings(mut self, raw: impl Into<String>) -> Self {
        self.mappings = Some(raw.into());
        self
    }

    /// Sets the full sync mappings (same syntax as [`mappings`](Self::mappings)).
    pub fn full_sync_mappings(mut self, raw: impl Into<String>) -> Self {
        self.full_sync_mappings = Some(raw.into());
        self
    }

    /// Sets the share targets.
    ///
    /// # Arguments
    ///
    /// * `raw` - Newline-separated `local_root#share_code#receive_code#remote_cid` lines
    pub fn share_targets(mut self, raw: impl Into<String>) -> Self {
        self.share_targets = Some(raw.into());
        self
    }

    /// Sets the address media players use to reach this service.
    pub fn server_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        let trimmed = address.trim().trim_end_matches('/');
        self.server_address = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.api_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        let cookie = cookie.into();
        let trimmed = cookie.trim();
        self.cookie = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Replaces the media extension allow-list. Leading dots are stripped.
    pub fn media_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.media_extensions = Some(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        );
        self
    }

    /// Sets the delay between successive listing requests.
    ///
    /// Default: 2 seconds
    pub fn list_cooldown(mut self, cooldown: Duration) -> Self {
        self.list_cooldown = Some(cooldown);
        self
    }

    /// Sets the activity feed polling interval.
    ///
    /// Default: 10 seconds
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = Some(interval);
        self
    }

    /// Default: 120 seconds
    pub fn redirect_cache_ttl(mut self, ttl: Duration) -> Self {
        self.redirect_cache_ttl = Some(ttl);
        self
    }

    pub fn redirect_cache_capacity(mut self, capacity: usize) -> Self {
        self.redirect_cache_capacity = Some(capacity);
        self
    }

    pub fn redirect_strict_status(mut self, strict: bool) -> Self {
        self.redirect_strict_status = strict;
        self
    }

    /// Sets how long to wait before asking the media server to refresh.
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Sets how many pointer files of one listing page a sync writes concurrently.
    pub fn sync_workers(mut self, workers: usize) -> Self {
        self.sync_workers = Some(workers);
        self
    }

    pub fn media_server(mut self, server: MediaServerConfig) -> Self {
        self.media_server = Some(server);
        self
    }

    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = Some(address.into());
        self
    }

    pub fn enable_life_monitor(mut self, enabled: bool) -> Self {
        self.enable_life_monitor = Some(enabled);
        self
    }

    pub fn enable_incremental(mut self, enabled: bool) -> Self {
        self.enable_incremental = Some(enabled);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMapping`] for malformed mapping or share lines and
    /// [`Error::Config`] when a value is out of range.
    pub fn build(self) -> Result<StrmConfig> {
        let mappings = match &self.mappings {
            Some(raw) => PathMapping::parse_list(raw)?,
            None => Vec::new(),
        };
        let full_sync_mappings = match &self.full_sync_mappings {
            Some(raw) => PathMapping::parse_list(raw)?,
            None => Vec::new(),
        };
        let share_targets = match &self.share_targets {
            Some(raw) => ShareTarget::parse_list(raw)?,
            None => Vec::new(),
        };

        let bind_address = self
            .bind_address
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDRESS)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;

        let config = StrmConfig {
            mappings,
            full_sync_mappings,
            share_targets,
            server_address: self.server_address,
            api_token: self.api_token,
            cookie: self.cookie,
            media_extensions: self.media_extensions.unwrap_or_else(|| {
                DEFAULT_MEDIA_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
            list_cooldown: self.list_cooldown.unwrap_or(DEFAULT_LIST_COOLDOWN),
            monitor_interval: self.monitor_interval.unwrap_or(DEFAULT_MONITOR_INTERVAL),
            redirect_cache_ttl: self.redirect_cache_ttl.unwrap_or(DEFAULT_REDIRECT_CACHE_TTL),
            redirect_cache_capacity: self
                .redirect_cache_capacity
                .unwrap_or(DEFAULT_REDIRECT_CACHE_CAPACITY),
            redirect_strict_status: self.redirect_strict_status,
            refresh_delay: self.refresh_delay.unwrap_or(DEFAULT_REFRESH_DELAY),
            sync_workers: self.sync_workers.unwrap_or(1),
            media_server: self.media_server,
            bind_address,
            enable_life_monitor: self.enable_life_monitor.unwrap_or(false),
            enable_incremental: self.enable_incremental.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Normalise a remote path: absolute, single separators, no trailing slash.
pub fn normalize_remote_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Lower-cased extension of a file name, without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Parse a comma / whitespace separated extension list
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn millis(key: &str, value: i64) -> Result<Duration> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| Error::Config(format!("{} must not be negative", key)))
}

fn count(key: &str, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::Config(format!("{} must not be negative", key)))
}

//! # Redirect Resolver
//!
//! Turns a `/redirect_url` query into a signed download URL.
//!
//! Two modes, chosen by the presence of `share_code`:
//!
//! - **Private**: `pickcode` (17 alphanumeric characters), optional `app`
//!   selecting the endpoint variant, optional `file_name` used for logging.
//! - **Share**: `share_code`, optional `receive_code` (fetched when absent),
//!   and either a numeric `id` or a `file_name` searched inside the share.
//!
//! All parameter validation happens before any remote call. Results are
//! cached briefly, keyed by the full parameter set plus the client's
//! User-Agent, since signed URLs are tied to the requesting client.
//! Concurrent misses for one key wait on a single remote lookup; when that
//! lookup fails the next waiter tries again, so failures are never shared.

use bridge_traits::drive::{Pickcode, RemoteDrive, ShareContext};
use bridge_traits::time::Clock;
use core_runtime::config::StrmConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument};

use crate::cache::TtlCache;
use crate::error::{RedirectError, Result};

/// Length of a share receive code
pub const RECEIVE_CODE_LEN: usize = 4;

/// Raw query parameters of `/redirect_url`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectQuery {
    pub pickcode: Option<String>,
    pub file_name: Option<String>,
    pub app: Option<String>,
    pub share_code: Option<String>,
    pub receive_code: Option<String>,
    pub id: Option<String>,
    pub apikey: Option<String>,
}

/// How a file inside a share is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareFile {
    Id(String),
    /// Searched by exact name
    Name(String),
}

/// A validated redirect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectRequest {
    Private {
        pickcode: Pickcode,
        app: Option<String>,
        file_name: Option<String>,
    },
    Share {
        share_code: String,
        receive_code: Option<String>,
        file: ShareFile,
    },
}

/// Blank counts as absent; identifiers are validated exactly as sent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RedirectRequest {
    /// Validate raw query parameters
    pub fn from_query(query: &RedirectQuery) -> Result<Self> {
        if let Some(share_code) = present(&query.share_code) {
            return Self::share_from_query(share_code, query);
        }

        let raw = present(&query.pickcode).ok_or(RedirectError::MissingPickcode)?;
        let pickcode = Pickcode::parse(raw).ok_or_else(|| RedirectError::BadPickcode {
            pickcode: raw.to_string(),
            file_name: query.file_name.clone().unwrap_or_default(),
        })?;

        Ok(RedirectRequest::Private {
            pickcode,
            app: non_empty(&query.app).map(str::to_string),
            file_name: non_empty(&query.file_name).map(str::to_string),
        })
    }

    fn share_from_query(share_code: &str, query: &RedirectQuery) -> Result<Self> {
        let receive_code = present(&query.receive_code);
        if let Some(code) = receive_code {
            if code.chars().count() != RECEIVE_CODE_LEN {
                return Err(RedirectError::BadReceiveCode(code.to_string()));
            }
        }

        let file = if let Some(id) = present(&query.id) {
            if !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(RedirectError::BadFileId(id.to_string()));
            }
            ShareFile::Id(id.to_string())
        } else if let Some(path) = non_empty(&query.file_name) {
            // path-like names are searched by their last segment
            let name = path.rsplit('/').next().unwrap_or(path);
            if name.is_empty() {
                return Err(RedirectError::MissingShareFile(share_code.to_string()));
            }
            ShareFile::Name(name.to_string())
        } else {
            return Err(RedirectError::MissingShareFile(share_code.to_string()));
        };

        Ok(RedirectRequest::Share {
            share_code: share_code.to_string(),
            receive_code: receive_code.map(str::to_string),
            file,
        })
    }

    fn cache_key(&self, user_agent: Option<&str>) -> String {
        let ua = user_agent.unwrap_or_default();
        match self {
            RedirectRequest::Private { pickcode, app, .. } => {
                format!("p|{}|{}|{}", pickcode, app.as_deref().unwrap_or_default(), ua)
            }
            RedirectRequest::Share {
                share_code,
                receive_code,
                file,
            } => {
                let file = match file {
                    ShareFile::Id(id) => format!("id:{}", id),
                    ShareFile::Name(name) => format!("name:{}", name),
                };
                format!(
                    "s|{}|{}|{}|{}",
                    share_code,
                    receive_code.as_deref().unwrap_or_default(),
                    file,
                    ua
                )
            }
        }
    }
}

/// Where a player should be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectTarget {
    pub url: String,
    /// Suggested download name for `Content-Disposition`
    pub file_name: String,
}

/// Resolves redirect requests against the remote drive
pub struct RedirectResolver {
    drive: Arc<dyn RemoteDrive>,
    cache: TtlCache<String, RedirectTarget>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<RedirectTarget>>>>,
}

impl RedirectResolver {
    pub fn new(
        drive: Arc<dyn RemoteDrive>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            drive,
            cache: TtlCache::new(cache_capacity, cache_ttl, clock),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(drive: Arc<dyn RemoteDrive>, clock: Arc<dyn Clock>, config: &StrmConfig) -> Self {
        Self::new(
            drive,
            clock,
            config.redirect_cache_ttl,
            config.redirect_cache_capacity,
        )
    }

    /// Validate `query` and resolve it
    pub async fn resolve_query(
        &self,
        query: &RedirectQuery,
        user_agent: Option<&str>,
    ) -> Result<RedirectTarget> {
        let request = RedirectRequest::from_query(query).inspect_err(|e| debug!("{}", e))?;
        self.resolve(&request, user_agent).await
    }

    /// Resolve a validated request, serving repeats from the cache
    #[instrument(skip(self, request, user_agent))]
    pub async fn resolve(
        &self,
        request: &RedirectRequest,
        user_agent: Option<&str>,
    ) -> Result<RedirectTarget> {
        let key = request.cache_key(user_agent);
        if let Some(target) = self.cache.get(&key).await {
            debug!("Serving cached redirect for {}", target.file_name);
            return Ok(target);
        }

        let lookup = self
            .in_flight
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone();

        let result = lookup
            .get_or_try_init(|| self.fetch_and_cache(key.clone(), request, user_agent))
            .await
            .cloned();

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &lookup))
        {
            in_flight.remove(&key);
        }

        result
    }

    async fn fetch_and_cache(
        &self,
        key: String,
        request: &RedirectRequest,
        user_agent: Option<&str>,
    ) -> Result<RedirectTarget> {
        // an earlier lookup for this key may have finished while we queued
        if let Some(target) = self.cache.get(&key).await {
            return Ok(target);
        }

        let target = match request {
            RedirectRequest::Private {
                pickcode,
                app,
                file_name,
            } => {
                self.resolve_private(pickcode, app.as_deref(), file_name.as_deref(), user_agent)
                    .await?
            }
            RedirectRequest::Share {
                share_code,
                receive_code,
                file,
            } => {
                self.resolve_share(share_code, receive_code.as_deref(), file, user_agent)
                    .await?
            }
        };

        self.cache.insert(key, target.clone()).await;
        Ok(target)
    }

    async fn resolve_private(
        &self,
        pickcode: &Pickcode,
        app: Option<&str>,
        file_name: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<RedirectTarget> {
        debug!("Client UA: {}", user_agent.unwrap_or_default());

        let download = self.drive.download_url(pickcode, app, user_agent).await?;
        let name = download
            .file_name()
            .or(file_name)
            .unwrap_or(pickcode.as_str())
            .to_string();

        info!("Resolved download URL for {} ({})", name, pickcode);
        Ok(RedirectTarget {
            url: download.url,
            file_name: name,
        })
    }

    async fn resolve_share(
        &self,
        share_code: &str,
        receive_code: Option<&str>,
        file: &ShareFile,
        user_agent: Option<&str>,
    ) -> Result<RedirectTarget> {
        let receive_code = match receive_code {
            Some(code) => code.to_string(),
            None => self.drive.share_receive_code(share_code).await?,
        };
        let share = ShareContext::new(share_code, receive_code);

        let (file_id, known_name) = match file {
            ShareFile::Id(id) => (id.clone(), None),
            ShareFile::Name(name) => {
                let found = self
                    .drive
                    .search_share(&share, name)
                    .await?
                    .into_iter()
                    .find(|node| !node.is_directory && node.name == *name)
                    .ok_or_else(|| RedirectError::NotFoundInShare {
                        share_code: share_code.to_string(),
                        name: name.clone(),
                    })?;
                (found.id, Some(found.name))
            }
        };

        let download = self
            .drive
            .share_download_url(&share, &file_id, user_agent)
            .await?;
        let name = download
            .file_name()
            .map(str::to_string)
            .or(known_name)
            .unwrap_or_else(|| file_id.clone());

        info!("Resolved share download URL for {} ({}/{})", name, share_code, file_id);
        Ok(RedirectTarget {
            url: download.url,
            file_name: name,
        })
    }
}

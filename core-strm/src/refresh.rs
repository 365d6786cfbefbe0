//! Downstream media library refresh
//!
//! Best effort: callers log a failed refresh and move on.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::config::MediaServerConfig;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{Result, StrmError};

const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Asks a media server to pick up a new or changed file
#[async_trait]
pub trait LibraryRefresher: Send + Sync {
    async fn refresh(&self, local_path: &Path) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MediaUpdate<'a> {
    path: &'a str,
    update_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MediaUpdatedBody<'a> {
    updates: Vec<MediaUpdate<'a>>,
}

/// Emby / Jellyfin `Library/Media/Updated` notifier
pub struct EmbyRefresher {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
}

impl EmbyRefresher {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &MediaServerConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl LibraryRefresher for EmbyRefresher {
    #[instrument(skip(self), fields(path = %local_path.display()))]
    async fn refresh(&self, local_path: &Path) -> Result<()> {
        let path = local_path.to_string_lossy();
        let body = MediaUpdatedBody {
            updates: vec![MediaUpdate {
                path: path.as_ref(),
                update_type: "Created",
            }],
        };

        let url = format!(
            "{}/Library/Media/Updated?api_key={}",
            self.base_url,
            urlencoding::encode(&self.api_key)
        );
        let request = HttpRequest::new(HttpMethod::Post, url)
            .json(&body)?
            .timeout(REFRESH_TIMEOUT);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(StrmError::Provider(format!(
                "media server refresh returned status {}",
                response.status
            )));
        }

        debug!("Requested library refresh");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn config() -> MediaServerConfig {
        MediaServerConfig {
            base_url: "http://emby:8096/".to_string(),
            api_key: "key".to_string(),
        }
    }

    #[tokio::test]
    async fn test_refresh_posts_media_updated() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "http://emby:8096/Library/Media/Updated?api_key=key");
            let body: serde_json::Value =
                serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
            assert_eq!(body["Updates"][0]["Path"], "/strm/Show/S01E01.strm");
            assert_eq!(body["Updates"][0]["UpdateType"], "Created");
            Ok(HttpResponse {
                status: 204,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

        let refresher = EmbyRefresher::new(Arc::new(mock_http), &config());
        refresher
            .refresh(Path::new("/strm/Show/S01E01.strm"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_error_status() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 401,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

        let refresher = EmbyRefresher::new(Arc::new(mock_http), &config());
        assert!(refresher.refresh(Path::new("/strm/a.strm")).await.is_err());
    }
}

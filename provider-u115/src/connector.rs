//! 115 API connector implementation
//!
//! Implements the `RemoteDrive` trait for the 115 web APIs.

use async_trait::async_trait;
use bridge_traits::drive::{
    ChildPage, DownloadTarget, LifeEvent, LifeEventKind, Pickcode, RemoteDrive, RemoteNode,
    ShareContext, ROOT_ID,
};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cipher::PayloadCipher;
use crate::error::U115Error;
use crate::types::{
    nested_url, AppDownloadPayload, CategoryResponse, ChromeDownloadInfo, DataEnvelope,
    EncryptedResponse, FileEntry, FilesResponse, GetIdResponse, LifeListData, ShareDownloadData,
    ShareInfoData, ShareListData, WebDownloadResponse,
};

const WEBAPI_BASE: &str = "https://webapi.115.com";
const PROAPI_BASE: &str = "http://proapi.115.com";
const LIFE_API_BASE: &str = "https://life.115.com/api/1.0/web/1.0";

/// App identity used when the cookie does not name one
const DEFAULT_APP: &str = "android";

/// Entries requested per life-feed page
const LIFE_PAGE_SIZE: u32 = 1000;

/// Upper bound on life-feed pages fetched in one poll
const MAX_LIFE_PAGES: u32 = 20;

/// Results requested per share search
const SHARE_SEARCH_LIMIT: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `ssoent` segment of the `UID` cookie → app identity
const SSOENT_APPS: &[(&str, &str)] = &[
    ("A1", "web"),
    ("D1", "ios"),
    ("D3", "115ios"),
    ("F1", "android"),
    ("F3", "115android"),
    ("H3", "115ipad"),
    ("I1", "tv"),
    ("M1", "qandroid"),
    ("N1", "qios"),
    ("P1", "windows"),
    ("P2", "mac"),
    ("P3", "linux"),
    ("R1", "wechatmini"),
    ("R2", "alipaymini"),
    ("S1", "harmony"),
];

/// Derive the app identity from a session cookie.
///
/// The cookie's `UID` value looks like `<uid>_<ssoent>_<timestamp>`; the
/// `ssoent` names the client that logged in.
pub fn app_from_cookie(cookie: &str) -> Option<&'static str> {
    let uid = cookie
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("UID="))?;
    let ssoent = uid.split('_').nth(1)?;

    SSOENT_APPS
        .iter()
        .find(|(code, _)| *code == ssoent)
        .map(|(_, app)| *app)
}

/// Which download endpoint serves a pickcode request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEndpoint {
    /// `webapi.115.com/files/download`, plain JSON
    Web,
    /// `proapi.115.com/app/chrome/downurl`, encrypted
    Chrome,
    /// `proapi.115.com/{app}/2.0/ufile/download`, encrypted
    App(String),
}

fn life_event_kind(type_code: i64) -> LifeEventKind {
    match type_code {
        // upload_image_file, upload_file, receive_files
        1 | 2 | 14 => LifeEventKind::Upload,
        // move_image_file, move_file
        5 | 6 => LifeEventKind::RenameInto,
        _ => LifeEventKind::Other,
    }
}

/// 115 drive connector
///
/// The session cookie is read-only shared state; the connector is safe to use
/// from any number of tasks at once.
///
/// # Example
///
/// ```ignore
/// use provider_u115::U115Connector;
/// use bridge_traits::drive::RemoteDrive;
///
/// let connector = U115Connector::new(http_client, cookie)?;
/// let page = connector.list_children("0", 0, 1150).await?;
/// ```
pub struct U115Connector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// Session cookie sent with every request
    cookie: String,

    /// Default app identity (derived from the cookie)
    app: String,

    /// Needed for the encrypted app endpoints
    cipher: Option<Arc<dyn PayloadCipher>>,

    retry_policy: RetryPolicy,
}

impl U115Connector {
    /// Create a new 115 connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `cookie` - Session cookie (`UID=...; CID=...; SEID=...`)
    pub fn new(http_client: Arc<dyn HttpClient>, cookie: impl Into<String>) -> crate::Result<Self> {
        let cookie = cookie.into();
        let cookie = cookie.trim().to_string();
        if cookie.is_empty() {
            return Err(U115Error::InvalidCookie("cookie is empty".to_string()));
        }

        let app = app_from_cookie(&cookie).unwrap_or_else(|| {
            debug!("No known ssoent in cookie, using {}", DEFAULT_APP);
            DEFAULT_APP
        });

        Ok(Self {
            http_client,
            cookie,
            app: app.to_string(),
            cipher: None,
            retry_policy: RetryPolicy::none(),
        })
    }

    /// Enable the encrypted app endpoints
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Retry policy applied to every request (default: single attempt, so
    /// throttling surfaces to the caller)
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Default app identity
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Pick the endpoint serving a download request for `app`
    pub fn select_endpoint(&self, app: Option<&str>) -> DownloadEndpoint {
        let app = app
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.app);

        if app == "web" || self.cipher.is_none() {
            return DownloadEndpoint::Web;
        }

        if app == "chrome" {
            DownloadEndpoint::Chrome
        } else {
            DownloadEndpoint::App(app.to_string())
        }
    }

    fn request(&self, method: HttpMethod, url: String, user_agent: Option<&str>) -> HttpRequest {
        let mut request = HttpRequest::new(method, url)
            .cookie(self.cookie.clone())
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        if let Some(agent) = user_agent.filter(|ua| !ua.is_empty()) {
            request = request.header("User-Agent", agent);
        }

        request
    }

    #[instrument(skip(self, request))]
    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: HttpRequest) -> crate::Result<T> {
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| match e {
                bridge_traits::BridgeError::RateLimited(_) => U115Error::RateLimited {
                    endpoint: endpoint.to_string(),
                },
                other => U115Error::BridgeError(other),
            })?;

        Self::parse_response(endpoint, &response)
    }

    /// Check HTTP status and the `state` flag, then decode the body
    fn parse_response<T: DeserializeOwned>(endpoint: &str, response: &HttpResponse) -> crate::Result<T> {
        let status = response.status;

        // 115 answers throttled listings with 405
        if status == 405 || status == 429 {
            warn!("115 throttled {}: status={}", endpoint, status);
            return Err(U115Error::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }

        if !response.is_success() {
            warn!("115 request to {} failed: status={}", endpoint, status);
            return Err(U115Error::ApiError {
                status_code: status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        let value: Value = serde_json::from_slice(&response.body).map_err(|e| {
            U115Error::ParseError(format!("Failed to parse {} response: {}", endpoint, e))
        })?;

        let rejected = match value.get("state") {
            Some(Value::Bool(state)) => !state,
            Some(Value::Number(n)) => n.as_i64() == Some(0),
            _ => false,
        };

        if rejected {
            let errno = ["errno", "errNo", "code"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_i64))
                .unwrap_or_default();
            let message = ["error", "msg", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str))
                .unwrap_or("request rejected")
                .to_string();

            warn!("115 rejected {}: errno={} {}", endpoint, errno, message);
            return Err(U115Error::Rejected { errno, message });
        }

        serde_json::from_value(value).map_err(|e| {
            U115Error::ParseError(format!("Unexpected {} response shape: {}", endpoint, e))
        })
    }

    /// Convert a listing entry into a RemoteNode
    fn convert_entry(entry: FileEntry) -> RemoteNode {
        match entry.fid {
            Some(fid) => RemoteNode {
                id: fid,
                parent_id: entry.cid.unwrap_or_else(|| ROOT_ID.to_string()),
                name: entry.name,
                is_directory: false,
                pickcode: entry.pickcode,
                size: entry.size,
            },
            None => RemoteNode {
                id: entry.cid.unwrap_or_else(|| ROOT_ID.to_string()),
                parent_id: entry.pid.unwrap_or_else(|| ROOT_ID.to_string()),
                name: entry.name,
                is_directory: true,
                pickcode: None,
                size: None,
            },
        }
    }

    fn encode_pickcode_payload(&self, key: &str, pickcode: &Pickcode) -> crate::Result<String> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| U115Error::Cipher("no payload cipher configured".to_string()))?;
        let payload = serde_json::json!({ key: pickcode.as_str() });
        cipher.encrypt(payload.to_string().as_bytes())
    }

    fn decode_payload<T: DeserializeOwned>(&self, envelope: EncryptedResponse) -> crate::Result<T> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| U115Error::Cipher("no payload cipher configured".to_string()))?;
        let plain = cipher.decrypt(&envelope.data)?;
        serde_json::from_slice(&plain)
            .map_err(|e| U115Error::ParseError(format!("Failed to parse decrypted payload: {}", e)))
    }

    async fn web_download_url(
        &self,
        pickcode: &Pickcode,
        user_agent: Option<&str>,
    ) -> crate::Result<DownloadTarget> {
        let url = format!("{}/files/download?pickcode={}", WEBAPI_BASE, pickcode);
        let request = self.request(HttpMethod::Get, url, user_agent);
        let response: WebDownloadResponse = self.send("files/download", request).await?;

        let file_url = response
            .file_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| U115Error::NotFound(format!("download url for {}", pickcode)))?;

        let mut target = DownloadTarget::new(file_url);
        if let Some(name) = response.file_name {
            target = target.with_metadata("file_name", Value::String(name));
        }
        if let Some(size) = response.file_size {
            target = target.with_metadata("file_size", Value::from(size));
        }
        Ok(target)
    }

    async fn chrome_download_url(
        &self,
        pickcode: &Pickcode,
        user_agent: Option<&str>,
    ) -> crate::Result<DownloadTarget> {
        let data = self.encode_pickcode_payload("pickcode", pickcode)?;
        let url = format!("{}/app/chrome/downurl", PROAPI_BASE);
        let request = self
            .request(HttpMethod::Post, url, user_agent)
            .form(&[("data", data.as_str())]);

        let envelope: EncryptedResponse = self.send("app/chrome/downurl", request).await?;
        let payload: HashMap<String, ChromeDownloadInfo> = self.decode_payload(envelope)?;

        let info = payload
            .into_values()
            .next()
            .ok_or_else(|| U115Error::NotFound(format!("download url for {}", pickcode)))?;
        let file_url = nested_url(&info.url)
            .ok_or_else(|| U115Error::NotFound(format!("download url for {}", pickcode)))?;

        let mut target = DownloadTarget::new(file_url);
        if let Some(name) = info.file_name {
            target = target.with_metadata("file_name", Value::String(name));
        }
        if let Some(size) = info.file_size {
            target = target.with_metadata("file_size", Value::from(size));
        }
        Ok(target)
    }

    async fn app_download_url(
        &self,
        app: &str,
        pickcode: &Pickcode,
        user_agent: Option<&str>,
    ) -> crate::Result<DownloadTarget> {
        let data = self.encode_pickcode_payload("pick_code", pickcode)?;
        let url = format!("{}/{}/2.0/ufile/download", PROAPI_BASE, app);
        let request = self
            .request(HttpMethod::Post, url, user_agent)
            .form(&[("data", data.as_str())]);

        let envelope: EncryptedResponse = self.send("ufile/download", request).await?;
        let payload: AppDownloadPayload = self.decode_payload(envelope)?;

        if payload.url.is_empty() {
            return Err(U115Error::NotFound(format!("download url for {}", pickcode)));
        }

        let mut target = DownloadTarget::new(payload.url.clone());
        if let Some(name) = file_name_from_url(&payload.url) {
            target = target.with_metadata("file_name", Value::String(name));
        }
        if let Some(size) = payload.file_size {
            target = target.with_metadata("file_size", Value::from(size));
        }
        Ok(target)
    }
}

/// Last path segment of a signed URL, percent-decoded
fn file_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = after_scheme.split_once('/')?;
    let segment = path.rsplit('/').next().filter(|s| !s.is_empty())?;

    Some(
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string()),
    )
}

#[async_trait]
impl RemoteDrive for U115Connector {
    #[instrument(skip(self))]
    async fn list_children(&self, dir_id: &str, offset: u64, limit: u64) -> Result<ChildPage> {
        let url = format!(
            "{}/files?aid=1&cid={}&offset={}&limit={}&show_dir=1&record_open_time=0&format=json",
            WEBAPI_BASE,
            urlencoding::encode(dir_id),
            offset,
            limit
        );
        let request = self.request(HttpMethod::Get, url, None);
        let response: FilesResponse = self.send("files", request).await?;

        let nodes: Vec<RemoteNode> = response
            .data
            .into_iter()
            .map(Self::convert_entry)
            .collect();
        let total = response.count.unwrap_or(offset + nodes.len() as u64);

        debug!("Listed {} children of {} (total {})", nodes.len(), dir_id, total);
        Ok(ChildPage { nodes, total })
    }

    #[instrument(skip(self))]
    async fn resolve_dir_id(&self, path: &str) -> Result<Option<String>> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Some(ROOT_ID.to_string()));
        }

        let url = format!(
            "{}/files/getid?path={}",
            WEBAPI_BASE,
            urlencoding::encode(&format!("/{}", trimmed))
        );
        let request = self.request(HttpMethod::Get, url, None);
        let response: GetIdResponse = self.send("files/getid", request).await?;

        if response.id == ROOT_ID || response.id.is_empty() {
            info!("Remote directory not found: {}", path);
            return Ok(None);
        }

        Ok(Some(response.id))
    }

    #[instrument(skip(self))]
    async fn get_directory(&self, dir_id: &str) -> Result<RemoteNode> {
        if dir_id == ROOT_ID {
            return Ok(RemoteNode {
                id: ROOT_ID.to_string(),
                parent_id: ROOT_ID.to_string(),
                name: String::new(),
                is_directory: true,
                pickcode: None,
                size: None,
            });
        }

        let url = format!(
            "{}/category/get?cid={}",
            WEBAPI_BASE,
            urlencoding::encode(dir_id)
        );
        let request = self.request(HttpMethod::Get, url, None);
        let response: CategoryResponse = self.send("category/get", request).await?;

        if response.file_name.is_empty() {
            return Err(U115Error::NotFound(format!("directory {}", dir_id)).into());
        }

        let parent_id = response
            .paths
            .last()
            .map(|p| p.file_id.clone())
            .unwrap_or_else(|| ROOT_ID.to_string());

        Ok(RemoteNode {
            id: dir_id.to_string(),
            parent_id,
            name: response.file_name,
            is_directory: true,
            pickcode: None,
            size: None,
        })
    }

    #[instrument(skip(self, user_agent), fields(pickcode = %pickcode))]
    async fn download_url(
        &self,
        pickcode: &Pickcode,
        app: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DownloadTarget> {
        let endpoint = self.select_endpoint(app);
        debug!("Requesting download url via {:?}", endpoint);

        let target = match &endpoint {
            DownloadEndpoint::Web => self.web_download_url(pickcode, user_agent).await?,
            DownloadEndpoint::Chrome => self.chrome_download_url(pickcode, user_agent).await?,
            DownloadEndpoint::App(app) => self.app_download_url(app, pickcode, user_agent).await?,
        };

        info!("Resolved download url for {}", pickcode);
        Ok(target)
    }

    #[instrument(skip(self, share), fields(share_code = %share.share_code))]
    async fn list_share_children(
        &self,
        share: &ShareContext,
        dir_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ChildPage> {
        let url = format!(
            "{}/share/snap?share_code={}&receive_code={}&cid={}&offset={}&limit={}",
            WEBAPI_BASE,
            urlencoding::encode(&share.share_code),
            urlencoding::encode(&share.receive_code),
            urlencoding::encode(dir_id),
            offset,
            limit
        );
        let request = self.request(HttpMethod::Get, url, None);
        let response: DataEnvelope<ShareListData> = self.send("share/snap", request).await?;

        let nodes: Vec<RemoteNode> = response
            .data
            .list
            .into_iter()
            .map(Self::convert_entry)
            .collect();
        let total = response
            .data
            .count
            .unwrap_or(offset + nodes.len() as u64);

        debug!("Listed {} share children of {}", nodes.len(), dir_id);
        Ok(ChildPage { nodes, total })
    }

    #[instrument(skip(self))]
    async fn share_receive_code(&self, share_code: &str) -> Result<String> {
        let url = format!(
            "{}/share/shareinfo?share_code={}",
            WEBAPI_BASE,
            urlencoding::encode(share_code)
        );
        let request = self.request(HttpMethod::Get, url, None);
        let response: DataEnvelope<ShareInfoData> = self.send("share/shareinfo", request).await?;

        response
            .data
            .receive_code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| U115Error::NotFound(format!("receive code of {}", share_code)).into())
    }

    #[instrument(skip(self, share), fields(share_code = %share.share_code))]
    async fn search_share(&self, share: &ShareContext, name: &str) -> Result<Vec<RemoteNode>> {
        let url = format!(
            "{}/share/search?share_code={}&receive_code={}&search_value={}&cid=0&offset=0&limit={}",
            WEBAPI_BASE,
            urlencoding::encode(&share.share_code),
            urlencoding::encode(&share.receive_code),
            urlencoding::encode(name),
            SHARE_SEARCH_LIMIT
        );
        let request = self.request(HttpMethod::Get, url, None);
        let response: DataEnvelope<ShareListData> = self.send("share/search", request).await?;

        Ok(response
            .data
            .list
            .into_iter()
            .map(Self::convert_entry)
            .collect())
    }

    #[instrument(skip(self, share, user_agent), fields(share_code = %share.share_code))]
    async fn share_download_url(
        &self,
        share: &ShareContext,
        file_id: &str,
        user_agent: Option<&str>,
    ) -> Result<DownloadTarget> {
        let url = format!(
            "{}/share/downurl?share_code={}&receive_code={}&file_id={}",
            WEBAPI_BASE,
            urlencoding::encode(&share.share_code),
            urlencoding::encode(&share.receive_code),
            urlencoding::encode(file_id)
        );
        let request = self.request(HttpMethod::Get, url, user_agent);
        let response: DataEnvelope<ShareDownloadData> = self.send("share/downurl", request).await?;

        let file_url = nested_url(&response.data.url).ok_or_else(|| {
            U115Error::NotFound(format!("download url for share file {}", file_id))
        })?;

        let mut target = DownloadTarget::new(file_url);
        if let Some(name) = response.data.file_name {
            target = target.with_metadata("file_name", Value::String(name));
        }
        if let Some(size) = response.data.file_size {
            target = target.with_metadata("file_size", Value::from(size));
        }
        Ok(target)
    }

    #[instrument(skip(self))]
    async fn life_events(&self, since: i64) -> Result<Vec<LifeEvent>> {
        let mut groups = Vec::new();
        for page in 0..MAX_LIFE_PAGES {
            let url = format!(
                "{}/life/life_list?start={}&limit={}&show_type=0&start_time={}",
                LIFE_API_BASE,
                page * LIFE_PAGE_SIZE,
                LIFE_PAGE_SIZE,
                since + 1
            );
            let request = self.request(HttpMethod::Get, url, None);
            let response: DataEnvelope<LifeListData> =
                self.send("life/life_list", request).await?;

            let fetched = response.data.list.len();
            groups.extend(response.data.list);
            if fetched < LIFE_PAGE_SIZE as usize {
                break;
            }
            if page + 1 == MAX_LIFE_PAGES {
                warn!(
                    "Life feed still full after {} pages, rest is left for the next poll",
                    MAX_LIFE_PAGES
                );
            }
        }

        let mut events: Vec<LifeEvent> = groups
            .into_iter()
            .flat_map(|group| {
                let type_code = group.type_code.unwrap_or_default();
                let group_time = group.update_time.unwrap_or_default();
                group.items.into_iter().map(move |item| LifeEvent {
                    kind: life_event_kind(type_code),
                    type_code,
                    file_id: item.file_id,
                    file_name: item.file_name,
                    parent_id: item.parent_id.unwrap_or_else(|| ROOT_ID.to_string()),
                    pickcode: item.pick_code,
                    is_directory: item.file_category == Some(0),
                    occurred_at: item.update_time.unwrap_or(group_time),
                })
            })
            .filter(|event| event.occurred_at > since)
            .collect();

        events.sort_by_key(|event| event.occurred_at);

        debug!("Fetched {} life events since {}", events.len(), since);
        Ok(events)
    }
}

//! Remote Drive Abstraction
//!
//! The contract between the STRM core and a cloud-drive connector. Traversal is
//! always live: nothing in here is persisted locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Identifier of the drive root directory
pub const ROOT_ID: &str = "0";

/// Required length of a well-formed pickcode
pub const PICKCODE_LEN: usize = 17;

/// Opaque, fixed-format token identifying one file on the remote drive.
///
/// Always 17 ASCII alphanumerics; stored lower-cased since the remote API
/// treats the token case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pickcode(String);

impl Pickcode {
    /// Validate and normalise a raw handle
    pub fn parse(raw: &str) -> Option<Self> {
        if Self::is_well_formed(raw) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Shape check only: fixed length, ASCII alphanumeric
    pub fn is_well_formed(raw: &str) -> bool {
        raw.len() == PICKCODE_LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pickcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Pickcode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Pickcode::parse(&value).ok_or(value)
    }
}

impl From<Pickcode> for String {
    fn from(value: Pickcode) -> Self {
        value.0
    }
}

/// One entry in a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    /// Remote identifier (numeric on the wire, kept opaque)
    pub id: String,
    /// Identifier of the containing directory
    pub parent_id: String,
    pub name: String,
    pub is_directory: bool,
    /// Download handle; `None` for directories and for nodes the remote
    /// returned without one
    pub pickcode: Option<String>,
    pub size: Option<u64>,
}

impl RemoteNode {
    /// Returns the pickcode only when it is present and well-formed
    pub fn valid_pickcode(&self) -> Option<Pickcode> {
        self.pickcode.as_deref().and_then(Pickcode::parse)
    }
}

/// One page of a paginated directory listing
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    pub nodes: Vec<RemoteNode>,
    /// Total number of children in the directory
    pub total: u64,
}

/// Credentials addressing a publicly shared subtree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareContext {
    pub share_code: String,
    pub receive_code: String,
}

impl ShareContext {
    pub fn new(share_code: impl Into<String>, receive_code: impl Into<String>) -> Self {
        Self {
            share_code: share_code.into(),
            receive_code: receive_code.into(),
        }
    }
}

/// A signed, time-limited download URL with the side data the remote returned
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub url: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Suggested filename, when the remote supplied one
    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get("file_name").and_then(|v| v.as_str())
    }
}

/// Kind of an activity-feed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeEventKind {
    /// A file was uploaded or received into the drive
    Upload,
    /// A file was moved or renamed into place
    RenameInto,
    Other,
}

/// One entry from the activity feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifeEvent {
    pub kind: LifeEventKind,
    /// Raw event-type code as reported by the feed
    pub type_code: i64,
    pub file_id: String,
    pub file_name: String,
    pub parent_id: String,
    pub pickcode: Option<String>,
    pub is_directory: bool,
    /// Unix timestamp (seconds) when the action happened
    pub occurred_at: i64,
}

/// Remote cloud-drive connector
///
/// Every call is a blocking remote round-trip from the caller's point of view.
/// Implementations must be safe for concurrent use; the session credential is
/// read-only shared state.
#[async_trait]
pub trait RemoteDrive: Send + Sync {
    /// List one page of a directory's children
    ///
    /// Returns `BridgeError::RateLimited` when the remote throttles the call.
    async fn list_children(&self, dir_id: &str, offset: u64, limit: u64) -> Result<ChildPage>;

    /// Resolve a directory path (e.g. `/Media/Movies`) to its identifier.
    ///
    /// Returns `Ok(None)` when no such directory exists.
    async fn resolve_dir_id(&self, path: &str) -> Result<Option<String>>;

    /// Fetch a single directory node, used to walk parent identifiers upward
    async fn get_directory(&self, dir_id: &str) -> Result<RemoteNode>;

    /// Exchange a pickcode for a signed download URL
    ///
    /// `app` selects the endpoint variant; `user_agent` is forwarded upstream
    /// because the signed URL is bound to it.
    async fn download_url(
        &self,
        pickcode: &Pickcode,
        app: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DownloadTarget>;

    /// List one page of a shared directory's children
    async fn list_share_children(
        &self,
        share: &ShareContext,
        dir_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ChildPage>;

    /// Look up the receive code of a share owned by the session
    async fn share_receive_code(&self, share_code: &str) -> Result<String>;

    /// Search a share by file name
    async fn search_share(&self, share: &ShareContext, name: &str) -> Result<Vec<RemoteNode>>;

    /// Exchange share credentials and a file id for a signed download URL
    async fn share_download_url(
        &self,
        share: &ShareContext,
        file_id: &str,
        user_agent: Option<&str>,
    ) -> Result<DownloadTarget>;

    /// Activity-feed entries that happened strictly after `since` (unix seconds)
    async fn life_events(&self, since: i64) -> Result<Vec<LifeEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickcode_validation() {
        assert!(Pickcode::parse("abcdefghijklmno12").is_some());
        assert!(Pickcode::parse("abcdefghijklmno1").is_none());
        assert!(Pickcode::parse("abcdefghijklmno123").is_none());
        assert!(Pickcode::parse("abcdefghijklmn-12").is_none());
        assert!(Pickcode::parse("").is_none());
    }

    #[test]
    fn test_pickcode_lowercased() {
        let pickcode = Pickcode::parse("ABCDEFGHIJKLMNO12").unwrap();
        assert_eq!(pickcode.as_str(), "abcdefghijklmno12");
    }

    #[test]
    fn test_valid_pickcode_on_node() {
        let mut node = RemoteNode {
            id: "1".to_string(),
            parent_id: "0".to_string(),
            name: "a.mkv".to_string(),
            is_directory: false,
            pickcode: Some("short".to_string()),
            size: None,
        };
        assert!(node.valid_pickcode().is_none());

        node.pickcode = Some("abcdefghijklmno12".to_string());
        assert!(node.valid_pickcode().is_some());
    }

    #[test]
    fn test_download_target_file_name() {
        let target = DownloadTarget::new("https://cdn.example/x")
            .with_metadata("file_name", serde_json::json!("movie.mkv"));

        assert_eq!(target.file_name(), Some("movie.mkv"));
        assert_eq!(DownloadTarget::new("u").file_name(), None);
    }
}

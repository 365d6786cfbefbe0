//! In-memory `RemoteDrive` used by the unit tests

use async_trait::async_trait;
use bridge_traits::drive::{
    ChildPage, DownloadTarget, LifeEvent, Pickcode, RemoteDrive, RemoteNode, ShareContext, ROOT_ID,
};
use bridge_traits::error::{BridgeError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeDrive {
    nodes: Mutex<Vec<RemoteNode>>,
    shares: Mutex<HashMap<String, String>>,
    life: Mutex<Vec<LifeEvent>>,
    throttled_listings: AtomicU32,
    feed_broken: AtomicBool,
    pub listing_calls: AtomicUsize,
    pub directory_calls: AtomicUsize,
    pub feed_calls: AtomicUsize,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, id: &str, parent_id: &str, name: &str) {
        self.nodes.lock().unwrap().push(RemoteNode {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            is_directory: true,
            pickcode: None,
            size: None,
        });
    }

    pub fn add_file(&self, id: &str, parent_id: &str, name: &str, pickcode: Option<&str>) {
        self.nodes.lock().unwrap().push(RemoteNode {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            is_directory: false,
            pickcode: pickcode.map(str::to_string),
            size: Some(1024),
        });
    }

    /// Re-parent or rename an existing node in place
    pub fn move_node(&self, id: &str, parent_id: &str, name: &str) {
        for node in self.nodes.lock().unwrap().iter_mut().filter(|n| n.id == id) {
            node.parent_id = parent_id.to_string();
            node.name = name.to_string();
        }
    }

    pub fn add_share(&self, share_code: &str, receive_code: &str) {
        self.shares
            .lock()
            .unwrap()
            .insert(share_code.to_string(), receive_code.to_string());
    }

    pub fn push_life_event(&self, event: LifeEvent) {
        self.life.lock().unwrap().push(event);
    }

    pub fn throttle_next_listings(&self, count: u32) {
        self.throttled_listings.store(count, Ordering::SeqCst);
    }

    pub fn break_feed(&self) {
        self.feed_broken.store(true, Ordering::SeqCst);
    }

    fn path_of(&self, dir_id: &str) -> Option<String> {
        let nodes = self.nodes.lock().unwrap();
        let mut segments = Vec::new();
        let mut current = dir_id.to_string();
        while current != ROOT_ID {
            let node = nodes.iter().find(|n| n.is_directory && n.id == current)?;
            segments.push(node.name.clone());
            current = node.parent_id.clone();
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    fn page(&self, dir_id: &str, offset: u64, limit: u64) -> Result<ChildPage> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);

        let throttled = self
            .throttled_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(BridgeError::RateLimited("files".to_string()));
        }

        let nodes = self.nodes.lock().unwrap();
        let children: Vec<RemoteNode> = nodes
            .iter()
            .filter(|n| n.parent_id == dir_id)
            .cloned()
            .collect();
        let total = children.len() as u64;

        Ok(ChildPage {
            nodes: children
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total,
        })
    }

    fn check_share(&self, share: &ShareContext) -> Result<()> {
        match self.shares.lock().unwrap().get(&share.share_code) {
            Some(code) if *code == share.receive_code => Ok(()),
            _ => Err(BridgeError::OperationFailed("share rejected".to_string())),
        }
    }
}

#[async_trait]
impl RemoteDrive for FakeDrive {
    async fn list_children(&self, dir_id: &str, offset: u64, limit: u64) -> Result<ChildPage> {
        self.page(dir_id, offset, limit)
    }

    async fn resolve_dir_id(&self, path: &str) -> Result<Option<String>> {
        let wanted = core_runtime::config::normalize_remote_path(path);
        if wanted == "/" {
            return Ok(Some(ROOT_ID.to_string()));
        }

        let ids: Vec<String> = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.is_directory)
            .map(|n| n.id.clone())
            .collect();

        Ok(ids
            .into_iter()
            .find(|id| self.path_of(id).as_deref() == Some(wanted.as_str())))
    }

    async fn get_directory(&self, dir_id: &str) -> Result<RemoteNode> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.is_directory && n.id == dir_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("directory {}", dir_id)))
    }

    async fn download_url(
        &self,
        pickcode: &Pickcode,
        _app: Option<&str>,
        _user_agent: Option<&str>,
    ) -> Result<DownloadTarget> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes
            .iter()
            .find(|n| n.pickcode.as_deref() == Some(pickcode.as_str()))
            .ok_or_else(|| BridgeError::NotFound(pickcode.to_string()))?;

        Ok(DownloadTarget::new(format!("https://cdn.example/{}", pickcode))
            .with_metadata("file_name", serde_json::json!(node.name)))
    }

    async fn list_share_children(
        &self,
        share: &ShareContext,
        dir_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ChildPage> {
        self.check_share(share)?;
        self.page(dir_id, offset, limit)
    }

    async fn share_receive_code(&self, share_code: &str) -> Result<String> {
        self.shares
            .lock()
            .unwrap()
            .get(share_code)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(share_code.to_string()))
    }

    async fn search_share(&self, share: &ShareContext, name: &str) -> Result<Vec<RemoteNode>> {
        self.check_share(share)?;
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.name.contains(name))
            .cloned()
            .collect())
    }

    async fn share_download_url(
        &self,
        share: &ShareContext,
        file_id: &str,
        _user_agent: Option<&str>,
    ) -> Result<DownloadTarget> {
        self.check_share(share)?;
        Ok(DownloadTarget::new(format!(
            "https://cdn.example/share/{}",
            file_id
        )))
    }

    async fn life_events(&self, since: i64) -> Result<Vec<LifeEvent>> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        if self.feed_broken.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("feed unavailable".to_string()));
        }

        let mut events: Vec<LifeEvent> = self
            .life
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.occurred_at > since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}

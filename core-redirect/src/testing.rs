//! Scripted `RemoteDrive` used by the unit tests

use async_trait::async_trait;
use bridge_traits::drive::{
    ChildPage, DownloadTarget, LifeEvent, Pickcode, RemoteDrive, RemoteNode, ShareContext,
};
use bridge_traits::error::Result;
use bridge_traits::BridgeError;
use std::sync::Mutex;
use std::time::Duration;

/// Records every remote call; answers from fixed data
#[derive(Default)]
pub struct FakeDrive {
    pub(crate) calls: Mutex<Vec<String>>,
    pub file_name: Option<String>,
    pub receive_code: Option<String>,
    pub share_files: Vec<RemoteNode>,
    pub fail_downloads: Mutex<u32>,
    pub download_delay: Option<Duration>,
}

impl FakeDrive {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteDrive for FakeDrive {
    async fn list_children(&self, _: &str, _: u64, _: u64) -> Result<ChildPage> {
        unreachable!()
    }

    async fn resolve_dir_id(&self, _: &str) -> Result<Option<String>> {
        unreachable!()
    }

    async fn get_directory(&self, _: &str) -> Result<RemoteNode> {
        unreachable!()
    }

    async fn download_url(
        &self,
        pickcode: &Pickcode,
        app: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DownloadTarget> {
        self.record(format!(
            "download:{}:{}:{}",
            pickcode,
            app.unwrap_or("-"),
            user_agent.unwrap_or("-")
        ));

        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.fail_downloads.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(BridgeError::OperationFailed("expired".to_string()));
        }

        let target = DownloadTarget::new(format!("https://cdn.example/{}", pickcode));
        Ok(match &self.file_name {
            Some(name) => target.with_metadata("file_name", serde_json::json!(name)),
            None => target,
        })
    }

    async fn list_share_children(
        &self,
        _: &ShareContext,
        _: &str,
        _: u64,
        _: u64,
    ) -> Result<ChildPage> {
        unreachable!()
    }

    async fn share_receive_code(&self, share_code: &str) -> Result<String> {
        self.record(format!("receive_code:{}", share_code));
        self.receive_code
            .clone()
            .ok_or_else(|| BridgeError::NotFound(share_code.to_string()))
    }

    async fn search_share(
        &self,
        share: &ShareContext,
        name: &str,
    ) -> Result<Vec<RemoteNode>> {
        self.record(format!("search:{}:{}", share.receive_code, name));
        Ok(self
            .share_files
            .iter()
            .filter(|node| node.name.contains(name))
            .cloned()
            .collect())
    }

    async fn share_download_url(
        &self,
        share: &ShareContext,
        file_id: &str,
        _: Option<&str>,
    ) -> Result<DownloadTarget> {
        self.record(format!("share_download:{}:{}", share.receive_code, file_id));
        Ok(DownloadTarget::new(format!(
            "https://cdn.example/share/{}",
            file_id
        )))
    }

    async fn life_events(&self, _: i64) -> Result<Vec<LifeEvent>> {
        unreachable!()
    }
}

pub fn file_node(id: &str, name: &str) -> RemoteNode {
    RemoteNode {
        id: id.to_string(),
        parent_id: "0".to_string(),
        name: name.to_string(),
        is_directory: false,
        pickcode: None,
        size: Some(1),
    }
}

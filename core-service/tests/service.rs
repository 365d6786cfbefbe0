use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem};
use bridge_traits::drive::{
    ChildPage, DownloadTarget, LifeEvent, Pickcode, RemoteDrive, RemoteNode, ShareContext,
};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::time::SystemClock;
use bridge_traits::BridgeError;
use core_runtime::events::{StrmEvent, SyncKind};
use core_runtime::StrmConfig;
use core_service::{ServiceDependencies, ServiceError, StrmService};
use core_strm::{SkipReason, TransferEvent, WriteOutcome};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const PICKCODE: &str = "abcdefghijklmno12";

/// `/Media` (id 1) holds `Movies/` (id 2), `a.mkv` and `a.nfo`;
/// `/Media/Movies` holds `b.mp4`.
struct LibraryDrive;

fn node(id: &str, parent_id: &str, name: &str, pickcode: Option<&str>) -> RemoteNode {
    RemoteNode {
        id: id.to_string(),
        parent_id: parent_id.to_string(),
        name: name.to_string(),
        is_directory: pickcode.is_none(),
        pickcode: pickcode.map(str::to_string),
        size: None,
    }
}

#[async_trait]
impl RemoteDrive for LibraryDrive {
    async fn list_children(&self, dir_id: &str, offset: u64, _: u64) -> BridgeResult<ChildPage> {
        let nodes = match dir_id {
            "1" => vec![
                node("2", "1", "Movies", None),
                node("10", "1", "a.mkv", Some("aaaaaaaaaaaaaaaa1")),
                node("11", "1", "a.nfo", Some("aaaaaaaaaaaaaaaa2")),
            ],
            "2" => vec![node("20", "2", "b.mp4", Some("bbbbbbbbbbbbbbbb1"))],
            other => return Err(BridgeError::NotFound(other.to_string())),
        };
        let total = nodes.len() as u64;
        Ok(ChildPage {
            nodes: if offset == 0 { nodes } else { Vec::new() },
            total,
        })
    }

    async fn resolve_dir_id(&self, path: &str) -> BridgeResult<Option<String>> {
        Ok((path == "/Media").then(|| "1".to_string()))
    }

    async fn get_directory(&self, dir_id: &str) -> BridgeResult<RemoteNode> {
        Err(BridgeError::NotFound(dir_id.to_string()))
    }

    async fn download_url(
        &self,
        pickcode: &Pickcode,
        _: Option<&str>,
        _: Option<&str>,
    ) -> BridgeResult<DownloadTarget> {
        Ok(DownloadTarget::new(format!("https://cdn.example/{}", pickcode)))
    }

    async fn list_share_children(
        &self,
        _: &ShareContext,
        _: &str,
        _: u64,
        _: u64,
    ) -> BridgeResult<ChildPage> {
        Ok(ChildPage::default())
    }

    async fn share_receive_code(&self, share_code: &str) -> BridgeResult<String> {
        Err(BridgeError::NotFound(share_code.to_string()))
    }

    async fn search_share(&self, _: &ShareContext, _: &str) -> BridgeResult<Vec<RemoteNode>> {
        Ok(Vec::new())
    }

    async fn share_download_url(
        &self,
        _: &ShareContext,
        file_id: &str,
        _: Option<&str>,
    ) -> BridgeResult<DownloadTarget> {
        Err(BridgeError::NotFound(file_id.to_string()))
    }

    async fn life_events(&self, _: i64) -> BridgeResult<Vec<LifeEvent>> {
        Ok(Vec::new())
    }
}

/// Upstream that answers every request with `502`; retries like a real client
#[derive(Default)]
struct FailingUpstream {
    hits: AtomicU32,
}

#[async_trait]
impl HttpClient for FailingUpstream {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(HttpResponse {
            status: 502,
            headers: HashMap::new(),
            body: "bad gateway".into(),
        })
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> BridgeResult<HttpResponse> {
        let mut response = self.execute(request.clone()).await?;
        for _ in 1..policy.max_attempts {
            if response.status < 500 {
                break;
            }
            response = self.execute(request.clone()).await?;
        }
        Ok(response)
    }
}

async fn deps() -> ServiceDependencies {
    deps_with(Arc::new(ReqwestHttpClient::new())).await
}

async fn deps_with(http_client: Arc<dyn HttpClient>) -> ServiceDependencies {
    ServiceDependencies::new(
        http_client,
        Arc::new(TokioFileSystem::new()),
        Arc::new(SqliteSettingsStore::in_memory().await.unwrap()),
        Arc::new(SystemClock),
    )
}

fn config(root: &Path) -> StrmConfig {
    StrmConfig::builder()
        .mappings(format!("{}#/Media", root.join("live").display()))
        .full_sync_mappings(format!("{}#/Media", root.join("library").display()))
        .server_address("http://nas:29876/")
        .list_cooldown(Duration::ZERO)
        .refresh_delay(Duration::ZERO)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_transfer_pointer_redirects_to_download() {
    let temp = TempDir::new().unwrap();
    let service = StrmService::new(config(temp.path()), deps().await, Arc::new(LibraryDrive));

    let outcome = service
        .handle_transfer(&TransferEvent::remote("/Media/Movies/2024", "Film.mkv", Some(PICKCODE)))
        .await
        .unwrap();

    let pointer = temp.path().join("live/Movies/2024/Film.strm");
    assert_eq!(
        outcome,
        WriteOutcome::Written {
            path: pointer.clone(),
            created: true
        }
    );

    let url = std::fs::read_to_string(&pointer).unwrap();
    assert_eq!(
        url,
        format!("http://nas:29876/redirect_url?pickcode={}", PICKCODE)
    );

    let response = service
        .redirect_router()
        .oneshot(
            Request::builder()
                .uri(url.trim_start_matches("http://nas:29876"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("https://cdn.example/{}", PICKCODE)
    );
}

#[tokio::test]
async fn test_full_sync_mirrors_media_tree() {
    let temp = TempDir::new().unwrap();
    let service = StrmService::new(config(temp.path()), deps().await, Arc::new(LibraryDrive));
    let mut events = service.subscribe_events();

    let report = service.full_sync().await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        StrmEvent::SyncStarted {
            kind: SyncKind::Full,
            ..
        }
    ));

    assert!(report.is_clean());
    assert_eq!(report.summary.written, 2);
    assert_eq!(report.summary.skipped, 1);

    let library = temp.path().join("library");
    assert_eq!(
        std::fs::read_to_string(library.join("a.strm")).unwrap(),
        "http://nas:29876/redirect_url?pickcode=aaaaaaaaaaaaaaaa1"
    );
    assert!(library.join("Movies/b.strm").exists());
    assert!(!library.join("a.nfo.strm").exists());

    let again = service.full_sync().await.unwrap();
    assert_eq!(again.summary.written, 0);
    assert_eq!(again.summary.unchanged, 2);
}

#[tokio::test]
async fn test_incremental_switch_off() {
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path());
    config.enable_incremental = false;
    let service = StrmService::new(config, deps().await, Arc::new(LibraryDrive));

    let outcome = service
        .handle_transfer(&TransferEvent::remote("/Media", "Film.mkv", Some(PICKCODE)))
        .await
        .unwrap();

    assert_eq!(outcome, WriteOutcome::Skipped(SkipReason::NotConfigured));
    assert!(!temp.path().join("live").exists());
}

#[tokio::test]
async fn test_bootstrap_requires_cookie() {
    let result = StrmService::bootstrap(deps().await).await;

    assert!(matches!(
        result,
        Err(ServiceError::CapabilityMissing { .. })
    ));
}

#[tokio::test]
async fn test_life_monitor_needs_mappings() {
    let service = StrmService::new(
        StrmConfig::builder()
            .enable_life_monitor(true)
            .build()
            .unwrap(),
        deps().await,
        Arc::new(LibraryDrive),
    );

    assert!(!service.start_life_monitor());
    assert!(!service.is_life_monitor_running());
}

#[tokio::test]
async fn test_redirect_failure_is_not_retried_upstream() {
    let temp = TempDir::new().unwrap();
    let upstream = Arc::new(FailingUpstream::default());
    let mut config = config(temp.path());
    config.cookie = Some("UID=1_A1_2; CID=c; SEID=s".to_string());

    let service =
        StrmService::bootstrap_with_config(config, deps_with(upstream.clone()).await).unwrap();

    let response = service
        .redirect_router()
        .oneshot(
            Request::builder()
                .uri(format!("/redirect_url?pickcode={}", PICKCODE))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);

    // batch syncs keep their retries
    let report = service.full_sync().await.unwrap();
    assert_eq!(report.root_failures.len(), 1);
    assert!(upstream.hits.load(Ordering::SeqCst) >= 1 + RetryPolicy::default().max_attempts);
}

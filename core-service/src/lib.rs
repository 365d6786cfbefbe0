//! Service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! settings, clock) and the remote drive connector into the STRM engines and
//! the redirect endpoint. Desktop hosts enable the `desktop-shims` feature
//! (which depends on `bridge-desktop`) and can use
//! [`ServiceDependencies::desktop`].

pub mod error;

pub use error::{Result, ServiceError};

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use bridge_traits::{
    drive::RemoteDrive,
    http::{HttpClient, RetryPolicy},
    storage::{FileSystemAccess, SettingsStore},
    time::Clock,
};
use core_redirect::{RedirectResolver, RedirectState};
use core_runtime::config::StrmConfig;
use core_runtime::events::{EventBus, StrmEvent, DEFAULT_EVENT_BUFFER_SIZE};
use core_strm::{
    EmbyRefresher, FullSyncEngine, IncrementalSyncHandler, LifeEventMonitor, ShareSyncEngine,
    SkipReason, SyncReport, TransferEvent, WriteOutcome,
};
use provider_u115::U115Connector;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Aggregated handle to all bridge dependencies the service requires.
pub struct ServiceDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystemAccess>,
        settings_store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            filesystem,
            settings_store,
            clock,
        }
    }

    /// Desktop bridges with settings in a SQLite file at `settings_path`.
    #[cfg(feature = "desktop-shims")]
    pub async fn desktop(settings_path: std::path::PathBuf) -> Result<Self> {
        let settings = bridge_desktop::SqliteSettingsStore::new(settings_path).await?;
        Ok(Self::new(
            Arc::new(bridge_desktop::ReqwestHttpClient::new()),
            Arc::new(bridge_desktop::TokioFileSystem::new()),
            Arc::new(settings),
            Arc::new(bridge_traits::time::SystemClock),
        ))
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct StrmService {
    config: Arc<StrmConfig>,
    deps: Arc<ServiceDependencies>,
    drive: Arc<dyn RemoteDrive>,
    sync_drive: Arc<dyn RemoteDrive>,
    event_bus: EventBus,
    incremental: Arc<IncrementalSyncHandler>,
    monitor: Arc<LifeEventMonitor>,
    resolver: Arc<RedirectResolver>,
}

impl StrmService {
    /// Create a service around an existing remote drive connector.
    ///
    /// The same connector serves redirects, the life monitor and batch
    /// syncs until [`StrmService::with_sync_drive`] replaces the latter.
    pub fn new(config: StrmConfig, deps: ServiceDependencies, drive: Arc<dyn RemoteDrive>) -> Self {
        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);

        let mut incremental = IncrementalSyncHandler::from_config(deps.filesystem.clone(), &config)
            .with_event_bus(event_bus.clone());
        if let Some(server) = &config.media_server {
            incremental = incremental
                .with_refresher(Arc::new(EmbyRefresher::new(deps.http_client.clone(), server)));
        }
        let incremental = Arc::new(incremental);

        let monitor = Arc::new(
            LifeEventMonitor::new(
                drive.clone(),
                incremental.clone(),
                config.monitor_interval,
                deps.clock.clone(),
            )
            .with_event_bus(event_bus.clone()),
        );

        let resolver = Arc::new(RedirectResolver::from_config(
            drive.clone(),
            deps.clock.clone(),
            &config,
        ));

        Self {
            config: Arc::new(config),
            deps: Arc::new(deps),
            sync_drive: drive.clone(),
            drive,
            event_bus,
            incremental,
            monitor,
            resolver,
        }
    }

    /// Load configuration from the settings store and connect to the drive.
    ///
    /// Fails with [`ServiceError::CapabilityMissing`] when no session cookie
    /// is configured.
    pub async fn bootstrap(deps: ServiceDependencies) -> Result<Self> {
        let config = StrmConfig::from_settings(deps.settings_store.as_ref()).await?;
        Self::bootstrap_with_config(config, deps)
    }

    /// Connect to the drive with an already loaded configuration.
    pub fn bootstrap_with_config(config: StrmConfig, deps: ServiceDependencies) -> Result<Self> {
        let cookie = config
            .cookie
            .clone()
            .ok_or_else(|| ServiceError::CapabilityMissing {
                capability: "remote session".to_string(),
                message: "no 115 cookie configured".to_string(),
            })?;

        // redirects and feed polls fail fast; only batch listings retry
        let live = U115Connector::new(deps.http_client.clone(), cookie.clone())?;
        let batch = U115Connector::new(deps.http_client.clone(), cookie)?
            .with_retry_policy(RetryPolicy::default());
        info!("Connected to 115 as app {}", live.app());

        Ok(Self::new(config, deps, Arc::new(live)).with_sync_drive(Arc::new(batch)))
    }

    /// Use a separate connector for full and share syncs
    pub fn with_sync_drive(mut self, drive: Arc<dyn RemoteDrive>) -> Self {
        self.sync_drive = drive;
        self
    }

    pub fn config(&self) -> &StrmConfig {
        &self.config
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<ServiceDependencies> {
        Arc::clone(&self.deps)
    }

    /// Receive sync, pointer and monitor events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StrmEvent> {
        self.event_bus.subscribe()
    }

    /// Mirror every configured full-sync mapping
    pub async fn full_sync(&self) -> Result<SyncReport> {
        let engine =
            FullSyncEngine::from_config(self.sync_drive.clone(), self.deps.filesystem.clone(), &self.config)?
                .with_event_bus(self.event_bus.clone());
        Ok(engine.run(&self.config.full_sync_mappings).await?)
    }

    /// Mirror every configured share target
    pub async fn share_sync(&self) -> Result<SyncReport> {
        let engine =
            ShareSyncEngine::from_config(self.sync_drive.clone(), self.deps.filesystem.clone(), &self.config)?
                .with_event_bus(self.event_bus.clone());
        Ok(engine.run(&self.config.share_targets).await?)
    }

    /// Handle one "transfer complete" notification from the host
    pub async fn handle_transfer(&self, event: &TransferEvent) -> Result<WriteOutcome> {
        if !self.config.enable_incremental {
            debug!("Incremental sync disabled, ignoring {}", event.file_name);
            return Ok(WriteOutcome::Skipped(SkipReason::NotConfigured));
        }
        Ok(self.incremental.handle(event).await?)
    }

    /// Start the activity-feed monitor.
    ///
    /// Returns `false` if the monitor did not start.
    pub fn start_life_monitor(&self) -> bool {
        if !self.config.enable_life_monitor {
            debug!("Life monitor disabled");
            return false;
        }
        if !self.incremental.is_configured() {
            warn!("Life monitor needs mappings and a server address, not starting");
            return false;
        }
        self.monitor.start()
    }

    pub async fn stop_life_monitor(&self) -> bool {
        self.monitor.stop().await
    }

    pub fn is_life_monitor_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// Router serving `/redirect_url`
    pub fn redirect_router(&self) -> Router {
        core_redirect::router(RedirectState::from_config(
            self.resolver.clone(),
            &self.config,
        ))
    }

    /// Run the redirect server (and the life monitor, when enabled) until
    /// `shutdown` resolves.
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        self.start_life_monitor();

        let served = core_redirect::serve(listener, self.redirect_router(), shutdown).await;

        self.stop_life_monitor().await;
        Ok(served?)
    }
}

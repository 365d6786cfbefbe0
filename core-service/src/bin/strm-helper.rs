//! strm-helper: mirror 115 media as `.strm` pointer files and serve the
//! redirect endpoint they point at.
//!
//! ```bash
//! # store settings once
//! strm-helper set strm.server_address http://nas:29876
//! strm-helper set strm.full_sync_mappings "/media/strm#/Pan/Media"
//!
//! # one-shot sync, then serve redirects
//! STRM_COOKIE="UID=...; CID=...; SEID=..." strm-helper full-sync
//! strm-helper serve
//! ```

use anyhow::{Context, Result};
use bridge_traits::time::LogLevel;
use clap::{Parser, Subcommand, ValueEnum};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::config::store_setting;
use core_runtime::StrmConfig;
use core_service::{ServiceDependencies, StrmService};
use std::path::PathBuf;
use tracing::{info, warn};

/// Mirror 115 media libraries as STRM pointer files
#[derive(Parser)]
#[command(name = "strm-helper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite file holding the settings
    #[arg(long, env = "STRM_SETTINGS", default_value = "strm-helper.db")]
    settings: PathBuf,

    /// Session cookie, overriding the stored one
    #[arg(long, env = "STRM_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    #[arg(long, env = "STRM_LOG_LEVEL", value_enum, default_value_t = Level::Info)]
    log_level: Level,

    /// pretty, json or compact
    #[arg(long, env = "STRM_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve /redirect_url and run the life monitor when enabled
    Serve,
    /// Mirror every full-sync mapping once
    FullSync,
    /// Mirror every share target once
    ShareSync,
    /// Store a setting, e.g. `set strm.enable_life_monitor true`
    Set { key: String, value: String },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_level(cli.log_level.into());
    if let Some(format) = &cli.log_format {
        logging = logging.with_format(format.parse::<LogFormat>()?);
    }
    init_logging(logging)?;

    let deps = ServiceDependencies::desktop(cli.settings.clone())
        .await
        .with_context(|| format!("opening settings at {}", cli.settings.display()))?;

    if let Command::Set { key, value } = &cli.command {
        store_setting(deps.settings_store.as_ref(), key, value).await?;
        println!("{} updated", key);
        return Ok(());
    }

    let mut config = StrmConfig::from_settings(deps.settings_store.as_ref())
        .await
        .context("loading configuration")?;
    if let Some(cookie) = cli.cookie {
        config.cookie = Some(cookie);
    }

    if let Command::Show = cli.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let service = StrmService::bootstrap_with_config(config, deps)?;

    match cli.command {
        Command::Serve => {
            service
                .serve(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Cannot listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                    info!("Shutting down");
                })
                .await?;
        }
        Command::FullSync => report(service.full_sync().await?),
        Command::ShareSync => report(service.share_sync().await?),
        Command::Set { .. } | Command::Show => {}
    }

    Ok(())
}

fn report(report: core_strm::SyncReport) {
    let summary = report.summary;
    println!(
        "{} sync {}: {} written, {} unchanged, {} skipped, {} failed ({} ms)",
        report.kind,
        report.run_id,
        summary.written,
        summary.unchanged,
        summary.skipped,
        summary.failed,
        summary.duration_ms
    );
    for failure in &report.root_failures {
        println!("  {}: {}", failure.root, failure.message);
    }
}

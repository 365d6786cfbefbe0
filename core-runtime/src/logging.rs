//! # Logging
//!
//! `tracing-subscriber` setup for the STRM helper plus an optional layer that
//! mirrors events to a host [`LoggerSink`].
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! tracing::info!("STRM helper started");
//! ```
//!
//! Events forwarded to the sink have credential fields (cookies, API keys,
//! receive codes) and `apikey=` query values masked unless redaction is
//! turned off.

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events are shown at the configured level by default
const WORKSPACE_CRATES: &[&str] = &[
    "strm_workspace",
    "strm_helper",
    "core_runtime",
    "core_strm",
    "core_redirect",
    "core_service",
    "provider_u115",
    "bridge_desktop",
];

/// Noisy dependencies pinned to `warn` in the default filter
const QUIET_DEPENDENCIES: &[&str] = &["h2", "hyper", "reqwest", "sqlx", "tower_http"];

/// Field names whose values never reach the sink
const SECRET_FIELDS: &[&str] = &[
    "cookie",
    "token",
    "apikey",
    "api_key",
    "receive_code",
    "authorization",
    "password",
];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored
    Pretty,
    /// One JSON object per line
    Json,
    /// One line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Compact;
    }
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates when no explicit filter is set
    pub level: LogLevel,
    /// `EnvFilter` directives, e.g. `core_strm=debug,provider_u115=trace`
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Mask credentials before events reach the sink
    pub redact_secrets: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            redact_secrets: true,
            display_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Mirror every event that passes the filter to `sink`
    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_secret_redaction(mut self, redact: bool) -> Self {
        self.redact_secrets = redact;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }
}

/// Install the global subscriber.
///
/// Fails when a subscriber is already installed or the filter does not parse.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let sink_layer = LoggerSinkLayer::new(config.logger_sink.clone(), config.redact_secrets);

    let registry = tracing_subscriber::registry().with(filter).with(sink_layer);
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_writer(io::stdout);

    let result = match config.format {
        LogFormat::Pretty => registry.with(fmt.pretty()).try_init(),
        LogFormat::Json => registry
            .with(fmt.json().flatten_event(true).with_current_span(true))
            .try_init(),
        LogFormat::Compact => registry.with(fmt.compact()).try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(filter) => filter.clone(),
        None => {
            let level = level_directive(config.level);
            WORKSPACE_CRATES
                .iter()
                .map(|krate| format!("{}={}", krate, level))
                .chain(QUIET_DEPENDENCIES.iter().map(|dep| format!("{}=warn", dep)))
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    EnvFilter::try_new(directives).map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn scrub(&self, key: &str, value: String) -> String {
        if self.redact {
            redact_if_sensitive(key, &value)
        } else {
            value
        }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = match *metadata.level() {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        };
        if level < sink.min_level() {
            return;
        }

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .map(|m| self.scrub("message", m))
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (key, value) in visitor.fields {
            let value = self.scrub(&key, value);
            entry = entry.with_field(key, value);
        }
        if let Some(span) = ctx.lookup_current() {
            entry.span_id = Some(span.name().to_string());
        }

        let sink = Arc::clone(sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", err);
                }
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{:?}", value));
    }
}

impl FieldCollector {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

/// Mask `value` when `field_name` names a credential; otherwise mask any
/// `apikey=` query value inside it.
///
/// ```ignore
/// info!(cookie = %redact_if_sensitive("cookie", &cookie), "Connector ready");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let field = field_name.to_ascii_lowercase();
    if SECRET_FIELDS.iter().any(|secret| field.contains(secret)) {
        return REDACTED.to_string();
    }
    redact_url(value)
}

/// Replace the value of every `apikey` query parameter in `text`
///
/// `http://nas:29876/redirect_url?apikey=s3cr3t&pickcode=abc` becomes
/// `http://nas:29876/redirect_url?apikey=[REDACTED]&pickcode=abc`.
pub fn redact_url(text: &str) -> String {
    const PARAM: &str = "apikey=";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(PARAM) {
        let boundary = pos == 0 || matches!(rest.as_bytes()[pos - 1], b'?' | b'&');
        let value_start = pos + PARAM.len();
        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];
        if boundary {
            let value_end = rest
                .find(|c: char| c == '&' || c == '#' || c.is_whitespace())
                .unwrap_or(rest.len());
            out.push_str(REDACTED);
            rest = &rest[value_end..];
        }
    }
    out.push_str(rest);
    out
}

//! # Structured Logging
//!
//! Subscriber setup for hosts embedding the detector:
//!
//! - JSON, pretty and compact output
//! - Level or directive filtering, with `RUST_LOG` honoured
//! - stderr or append-to-file output
//!
//! ## Example
//!
//! ```rust,ignore
//! use mbsd_core::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! let config = LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Json,
//!     ..Default::default()
//! };
//!
//! init_logging(&config)?;
//! tracing::debug!(from = "StartingUp", to = "Idle", "transition");
//! ```

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-sample features and peaks
    Trace,
    /// State transitions
    Debug,
    /// Run summaries (default)
    #[default]
    Info,
    /// Rejected settings
    Warn,
    /// Errors only
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON, one object per event
    Json,
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level
    pub level: LogLevel,
    /// Output format
    pub format: LogFormat,
    /// Append to this file instead of stderr
    pub file: Option<PathBuf>,
    /// Include timestamps
    pub timestamps: bool,
    /// Include source location (file:line)
    pub source_location: bool,
    /// Include thread IDs
    pub thread_ids: bool,
    /// Include thread names
    pub thread_names: bool,
    /// Include span enter/exit events
    pub span_events: bool,
    /// Directive filter, e.g. `"mbsd_core=trace,mbsd_sim=info"`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            file: None,
            timestamps: true,
            source_location: false,
            thread_ids: false,
            thread_names: false,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Verbose, pretty output for bench work.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            source_location: true,
            thread_names: true,
            span_events: true,
            ..Default::default()
        }
    }

    /// JSON output for collected replay runs.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            timestamps: true,
            ..Default::default()
        }
    }

    /// Errors only.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            ..Default::default()
        }
    }

    /// Redirect output to `path`.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Filter directive used when `RUST_LOG` is not set.
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(custom) => custom.clone(),
            None => self.level.to_string(),
        }
    }

    /// Build the subscriber filter.
    ///
    /// An explicit `filter` wins over `RUST_LOG`; an unparsable one falls
    /// back to `level`.
    pub fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(custom) => EnvFilter::try_new(custom).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

fn format_layer<S>(config: &LogConfig, writer: BoxMakeWriter) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.span_events {
        fmt::format::FmtSpan::FULL
    } else {
        fmt::format::FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.file.is_none())
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names)
        .with_span_events(span_events);

    match (config.format, config.timestamps) {
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
    }
}

/// Install the global subscriber.
///
/// Call once at host startup. If a subscriber is already installed the call
/// is a no-op. Fails only when the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> std::io::Result<()> {
    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing_subscriber::registry()
        .with(format_layer(config, writer))
        .with(config.env_filter());

    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

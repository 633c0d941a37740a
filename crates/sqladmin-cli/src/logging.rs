//! Logging setup for the command-line front end
//!
//! Console output goes to stderr so that table and CSV output on stdout stay
//! clean. A JSON file layer with daily rotation is written under the per-user
//! log directory for bug reports. `RUST_LOG` overrides the default filters.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "sqladmin.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON files; `None` disables the file layer
    pub log_dir: Option<PathBuf>,

    /// Filter for the console layer
    pub console_filter: String,

    /// Filter for the JSON file layer
    pub file_filter: String,

    /// Whether to log span open/close (for performance tracing)
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: sqladmin_core::settings::log_dir().ok(),
            console_filter: "warn".to_string(),
            file_filter: "info,sqladmin_connection=debug,sqladmin_query=debug".to_string(),
            enable_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Verbose console output, used for `--verbose`
    pub fn verbose() -> Self {
        Self {
            console_filter: "debug,tiberius=info".to_string(),
            enable_spans: true,
            ..Self::default()
        }
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped and must be held
/// for the life of the process.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.console_filter));

    // NEW fires once when the span is created; ENTER would fire on every async re-poll
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .with_filter(console_filter)
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if let Some(log_dir) = &config.log_dir {
        match std::fs::create_dir_all(log_dir) {
            Ok(()) => {
                let file_filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(&config.file_filter));
                let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
                let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(worker_guard);

                let json_layer = fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(span_events)
                    .with_ansi(false)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(non_blocking)
                    .with_filter(file_filter)
                    .boxed();
                layers.push(json_layer);
            }
            Err(e) => {
                // Console logging still works; report once it is installed
                tracing_subscriber::registry().with(layers).try_init()?;
                tracing::warn!(
                    log_dir = %log_dir.display(),
                    error = %e,
                    "could not create log directory, file logging disabled"
                );
                return Ok(None);
            }
        }
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = ?config.log_dir,
        "logging initialized"
    );

    Ok(guard)
}

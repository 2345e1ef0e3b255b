//! Tracing subscriber setup shared by the crowdwatch binaries.
//!
//! Stderr always gets human (compact) or JSON output. A log directory adds a
//! non-blocking daily-rolling file; the returned [`LogGuard`] must be held
//! for the life of the process or buffered lines are lost on exit.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Filter used when `RUST_LOG` is unset or unparseable. Targets match by
/// prefix, so `crowdwatch` also covers `crowdwatch_core` and friends.
pub const DEFAULT_FILTER: &str = "warn,crowdwatch=info";

const LOG_FILE_PREFIX: &str = "crowdwatch.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Directory for the rolling log file. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

/// Keeps the file writer's background thread alive.
#[must_use = "dropping the guard stops the file writer"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<LogGuard> {
    let filter = build_filter(std::env::var("RUST_LOG").ok(), DEFAULT_FILTER);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(match config.format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    });

    let mut file_guard = None;
    if let Some(dir) = &config.directory {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}

/// `RUST_LOG`-style directives, falling back to `default` when absent or
/// invalid.
pub fn build_filter(directives: Option<String>, default: &str) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

//! Tracing setup for the `quill` binary.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "quill=info";
const VERBOSE_LOG_FILTER: &str = "quill=debug";

pub struct LogConfig {
    pub verbose: bool,
    /// Emit JSON lines on stderr instead of human-readable output
    pub json: bool,
    /// Directory for the daily-rolling log file; skipped when it doesn't exist
    pub log_dir: Option<PathBuf>,
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`.
fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    })
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(build_filter(config.verbose))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(build_filter(config.verbose))
            .boxed()
    };
    layers.push(stderr_layer);

    let mut guard = None;
    if let Some(dir) = config.log_dir.filter(|d| d.is_dir()) {
        let appender = tracing_appender::rolling::daily(dir, "quill.log");
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(build_filter(config.verbose))
                .boxed(),
        );
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

//! `tracing` subscriber setup.
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! When a log directory is configured, a second layer writes daily-rolling
//! files through a non-blocking writer; the returned [`WorkerGuard`] must be
//! held until exit or buffered lines are lost.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LoggingSection};

pub const LOG_FILE_PREFIX: &str = "pitchboard.log";

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// `RUST_LOG` wins over the configured level when it is set and valid.
pub fn build_filter(configured: &str, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(configured)
        .with_context(|| format!("Invalid log level directive '{}'", configured))
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(config: &LoggingSection) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(&config.level, rust_log.as_deref())?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format)];
    let mut guard = None;

    if let Some(dir) = &config.directory {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        let file_layer = match config.format {
            LogFormat::Text => fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        };
        layers.push(file_layer);
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_configured_level_used_without_rust_log() {
        let filter = build_filter("warn", None).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_rust_log_overrides_configured_level() {
        let filter = build_filter("info", Some("pitchboard=trace")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_blank_or_invalid_rust_log_falls_back() {
        let blank = build_filter("debug", Some("  ")).unwrap();
        assert_eq!(blank.max_level_hint(), Some(LevelFilter::DEBUG));
        let invalid = build_filter("debug", Some("pitchboard=nonsense")).unwrap();
        assert_eq!(invalid.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_invalid_configured_level_is_error() {
        let err = build_filter("pitchboard=loud", None).unwrap_err();
        assert!(err.to_string().contains("pitchboard=loud"));
    }
}

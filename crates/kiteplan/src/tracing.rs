//! Tracing setup for the kiteplan CLI
//!
//! Logs go to stderr so the plan on stdout stays machine-readable. Every run
//! carries a correlation id.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Tracing output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Show all logs (trace level)
    Trace,
    /// Show debug and above
    Debug,
    /// Show info and above
    Info,
    /// Show warnings and above (default)
    Warn,
    /// Show errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    pub level: Level,
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
            filter: None,
        }
    }
}

static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Get or create the correlation id for this run
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Directive used when neither an explicit filter nor `RUST_LOG` is given
fn default_directive(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    ["kiteplan", "kiteplan_core", "kiteplan_context", "kiteplan_plan"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// An explicit filter wins over `RUST_LOG`, which wins over the level
fn build_filter(config: &TracingConfig) -> miette::Result<EnvFilter> {
    match &config.filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive(config.level))),
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))
}

/// Initialize tracing with the given configuration
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let correlation_id = correlation_id();

    let env_filter = build_filter(&config)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true);

            registry.with(layer).init();
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false);

            registry.with(layer).init();
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);

            registry.with(layer).init();
        }
    }

    tracing::debug!(
        correlation_id = %correlation_id,
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_default_directive_covers_workspace_crates() {
        let directive = default_directive(Level::INFO);
        assert_eq!(
            directive,
            "kiteplan=info,kiteplan_core=info,kiteplan_context=info,kiteplan_plan=info"
        );
        assert!(EnvFilter::try_new(directive).is_ok());
    }

    #[test]
    fn test_explicit_filter_overrides_rust_log() {
        temp_env::with_var("RUST_LOG", Some("kiteplan=trace"), || {
            let config = TracingConfig {
                filter: Some("kiteplan=error".to_string()),
                ..Default::default()
            };
            let filter = build_filter(&config).unwrap();
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));

            let filter = build_filter(&TracingConfig::default()).unwrap();
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        });
    }

    #[test]
    fn test_level_used_without_filter_or_rust_log() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = TracingConfig {
                level: Level::DEBUG,
                ..Default::default()
            };
            let filter = build_filter(&config).unwrap();
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        });
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        let config = TracingConfig {
            filter: Some("kiteplan=loud".to_string()),
            ..Default::default()
        };
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
    }

    #[test]
    fn test_correlation_id_consistency() {
        let id1 = correlation_id();
        let id2 = correlation_id();
        assert_eq!(id1, id2);
    }
}

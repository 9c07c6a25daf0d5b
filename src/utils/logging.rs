//! Tracing subscriber setup.
//!
//! Console output is pretty or JSON depending on `[logging] format`. When
//! `[logging] directory` is set, a daily rolling file (`sage.log.YYYY-MM-DD`)
//! receives the same events without ANSI colors. `SAGE_LOG` takes precedence
//! over the configured level and accepts full `EnvFilter` directives, e.g.
//! `SAGE_LOG=sage::rag=debug,info`.

use crate::types::{AppError, Result};
use crate::utils::toml_config::{LogFormat, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Environment variable consulted before the configured level.
pub const LOG_ENV: &str = "SAGE_LOG";

/// Build the filter from `SAGE_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process when file
/// logging is enabled, otherwise buffered lines are lost on exit.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };
    layers.push(console);

    let mut guard = None;
    if let Some(dir) = &config.directory {
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::Configuration(format!("Cannot create log directory {:?}: {}", dir, e))
        })?;
        let appender = tracing_appender::rolling::daily(dir, "sage.log");
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(level))
        .try_init()
        .map_err(|e| AppError::Configuration(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}

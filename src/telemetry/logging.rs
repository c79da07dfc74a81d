//! Logging configuration and initialization
//!
//! Console output in compact or JSON form, plus an optional non-blocking log
//! file.

use std::path::PathBuf;

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

/// Filter variable checked first
pub const LOG_ENV: &str = "BOKEH_LOG";
/// Set to "json" for JSON console output
pub const LOG_FORMAT_ENV: &str = "BOKEH_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Also write to this file (default: None)
    pub file_path: Option<PathBuf>,
    /// Use JSON format on the console (default: false)
    pub json_format: bool,
    /// Filter used when neither `BOKEH_LOG` nor `RUST_LOG` is set
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// `BOKEH_LOG`, then `RUST_LOG`, then `default_level`
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
            .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }

    fn use_json(&self) -> bool {
        json_requested(std::env::var(LOG_FORMAT_ENV).ok().as_deref(), self.json_format)
    }
}

fn json_requested(env_value: Option<&str>, fallback: bool) -> bool {
    env_value
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(fallback)
}

/// Install the global subscriber
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the program duration so buffered lines are flushed. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let use_json = config.use_json();

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = (config.console_enabled && use_json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let console_layer = (config.console_enabled && !use_json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(file_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        target: "bokeh_cam",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file = ?config.file_path,
        "Logging initialized"
    );

    Ok(guard)
}

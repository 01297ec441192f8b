//! Structured logging and tracing for decoy.
//!
//! Console output with uptime timestamps and module paths, plus JSON file
//! logging for post-mortem analysis of a game session. The level comes from
//! the configuration and can be overridden with `RUST_LOG`.

use decoy_config::Config;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither the config nor `RUST_LOG` say otherwise.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written into the log directory.
pub const LOG_FILE_NAME: &str = "decoy.log";

/// Resolve the filter string from an optional configuration.
pub fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file, if file logging is wanted
/// * `file_logging` - Whether to write the JSON log file at all
/// * `config` - Optional configuration supplying the log level
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
///
/// ```no_run
/// use decoy_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, file_logging: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);

    // RUST_LOG wins over the configured level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        let _ = subscriber.with(file_layer).try_init();
        return;
    }

    let _ = subscriber.try_init();
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Parse a configured filter, falling back to the default when it is invalid.
fn configured_filter(filter_str: &str) -> EnvFilter {
    EnvFilter::try_new(filter_str).unwrap_or_else(|e| {
        eprintln!("decoy: invalid log level {filter_str:?} ({e}), using {DEFAULT_FILTER:?}");
        default_env_filter()
    })
}

//! Logging setup with file rotation.

use crate::error::{SupervisorError, SupervisorResult};

use std::panic::Location;
use std::path::{Path, PathBuf};

use error_location::ErrorLocation;
use pgd_config::LoggingConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "pgdesk";
const LOG_FILE_SUFFIX: &str = "log";
const MAX_LOG_FILES: usize = 7;

/// Install the global subscriber: console plus a daily-rotated file in `log_dir`.
///
/// `RUST_LOG` takes precedence over the configured level. Records emitted
/// through the `log` facade are captured as well.
#[track_caller]
pub fn setup_logging(log_dir: &Path, config: &LoggingConfig) -> SupervisorResult<()> {
    let caller = Location::caller();
    let setup_error = |message: String| SupervisorError::LoggingSetup {
        path: log_dir.to_path_buf(),
        message,
        location: ErrorLocation::from(caller),
    };

    std::fs::create_dir_all(log_dir).map_err(|e| setup_error(e.to_string()))?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(true);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(log_dir)
        .map_err(|e| setup_error(e.to_string()))?;

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| setup_error(e.to_string()))?;

    Ok(())
}

/// Path of today's log file. The appender rotates on UTC dates.
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    log_dir.join(format!("{LOG_FILE_PREFIX}.{today}.{LOG_FILE_SUFFIX}"))
}

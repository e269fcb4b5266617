//! File logging for the session runner
//!
//! Stdout carries debuggee output and NDJSON events, so tracing output only
//! ever goes to a daily rolling file.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Filter override, in `EnvFilter` syntax
pub const LOG_ENV_VAR: &str = "RDEMON_LOG";

/// Log directory override
pub const LOG_DIR_ENV_VAR: &str = "RDEMON_LOG_DIR";

const LOG_FILE_NAME: &str = "rdemon.log";

/// Workspace crates logged at `info` unless overridden
const SESSION_CRATES: &[&str] = &["remote_demon", "rdemon_app", "rdemon_device", "rdemon_core"];

/// `info` for the session crates, `warn` for dependencies
pub fn default_filter() -> String {
    let mut directives: Vec<String> = SESSION_CRATES
        .iter()
        .map(|krate| format!("{}=info", krate))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Install the file subscriber.
///
/// ```bash
/// RDEMON_LOG=rdemon_device=trace rdemon --native -- /apps/demo/bin/demo
/// RDEMON_LOG_DIR=/tmp/rdemon rdemon -- ./app
/// ```
pub fn init() -> Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_filter()));

    // No stdout layer: stdout belongs to the session
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!(
        "Remote Demon {} logging to {}",
        env!("CARGO_PKG_VERSION"),
        log_dir.join(LOG_FILE_NAME).display()
    );

    Ok(())
}

/// `$RDEMON_LOG_DIR`, else `<data dir>/remote-demon/logs`
pub fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV_VAR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remote-demon")
        .join("logs")
}

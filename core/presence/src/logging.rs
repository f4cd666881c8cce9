//! Subscriber setup for the `flrp-presence` binary.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEBUG_LOG_ENV: &str = "FLRP_DEBUG_LOG";

/// Installs the global subscriber. With `log_file`, events go to that file
/// through a non-blocking writer whose guard must live until exit.
pub fn init(debug: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = if debug || debug_env_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match log_file.map(open_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        other => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            if let Some(Err(err)) = other {
                tracing::warn!(error = %err, "Failed to open log file; logging to stderr");
            }
            None
        }
    }
}

fn debug_env_enabled() -> bool {
    std::env::var(DEBUG_LOG_ENV)
        .map(|value| flrp_presence::config::parse_bool(&value))
        .unwrap_or(false)
}

fn open_appender(path: &Path) -> Result<RollingFileAppender, String> {
    let name = path
        .file_name()
        .ok_or_else(|| format!("{} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|err| err.to_string())
}

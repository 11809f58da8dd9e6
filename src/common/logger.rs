//! Logging setup and the append-only event log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "server", "client")
/// * `default_log_level` - The default log level (e.g., "debug", "info")
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}={},{}={}",
                    env!("CARGO_PKG_NAME").replace("-", "_"),
                    default_log_level,
                    binary_name,
                    default_log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Append-only record of system events.
///
/// Every line is stamped `[YYYY-MM-DD HH:MM:SS]` in local time and appended
/// to the log file; the unstamped line is mirrored to the console through
/// `tracing`. Writes are serialized under one lock so lines never interleave.
pub struct EventLog {
    file: Mutex<Option<File>>,
}

impl EventLog {
    /// Open the event log, appending to `path`.
    ///
    /// A file that cannot be opened is reported once on stderr; recording
    /// then continues console-only.
    pub fn open(path: &Path) -> Self {
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(error) => {
                eprintln!("failed to open event log {}: {error}", path.display());
                None
            }
        };
        Self {
            file: Mutex::new(file),
        }
    }

    /// An event log with no backing file. Used by tests.
    pub fn console_only() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Record one event line.
    pub fn record(&self, line: &str) {
        let stamped = format!("[{}] {line}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let mut file = self.file.lock().unwrap();
        if let Some(file) = file.as_mut()
            && let Err(error) = writeln!(file, "{stamped}")
        {
            tracing::warn!("event log write failed: {error}");
        }
        tracing::info!("{line}");
    }
}

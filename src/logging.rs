//! Logging setup.
//!
//! Statement and error text from `debug` queries goes through `tracing`;
//! these helpers install the subscriber that writes it out.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logs to stderr. Level comes from `RUST_LOG`, defaulting to `info`.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Appends logs to the file at `path`, creating parent directories.
///
/// Logging is best effort: when the file cannot be opened a warning goes to
/// stderr and no subscriber is installed.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .try_init();
}

/// Default log file: `<state dir>/dblink/dblink.log`, falling back to the
/// config directory, then the temp directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("dblink").join("dblink.log");
    }
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("dblink").join("dblink.log");
    }
    std::env::temp_dir().join("dblink.log")
}

//! Tracing setup for hosts embedding the supervisor.
//!
//! Library code only emits `tracing` events. A host that has no subscriber of
//! its own calls one of these once at startup. `RUST_LOG` overrides the
//! default filter in both.

use crate::error::{Error, Result};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Log to stderr, leaving stdout to the supervised process.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Log to an append-only file, for hosts that own the terminal.
pub fn init_tracing_to_file(path: &Path, default_filter: &str) -> Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            Error::Filesystem(format!("Failed to open log file {}: {}", path.display(), e))
        })?;

    Ok(tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .try_init()
        .is_ok())
}

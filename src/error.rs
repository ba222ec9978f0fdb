// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(relaunch::config::error))]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(relaunch::filesystem::error))]
    Filesystem(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not find {marker} in {} or any parent directory", .start.display())]
    #[diagnostic(
        code(relaunch::project::root_not_found),
        help("Run the build from inside the project, or install dependencies so the lockfile exists")
    )]
    RootNotFound { start: PathBuf, marker: String },

    #[error("No package manager detected{}",
        .0.as_ref().map(|p| format!(" (npm_execpath = '{}')", p)).unwrap_or_default()
    )]
    #[diagnostic(
        code(relaunch::project::package_manager),
        help("Start the build through npm, pnpm or yarn so that npm_execpath is set")
    )]
    PackageManagerUndetected(Option<String>),

    #[error("Corrupt PID record in {}: '{content}'", .path.display())]
    #[diagnostic(code(relaunch::store::corrupt))]
    CorruptRecord { path: PathBuf, content: String },

    #[error("Liveness query for PID {pid} failed: {reason}")]
    #[diagnostic(code(relaunch::probe::query_failed))]
    LivenessQuery { pid: u32, reason: String },

    #[error("Process {pid} did not exit within {timeout:?}")]
    #[diagnostic(
        code(relaunch::terminate::timeout),
        help("The process may be stuck in uninterruptible sleep. Check it with `ps -o pid,stat -p {pid}`")
    )]
    TerminationTimeout { pid: u32, timeout: Duration },

    #[error("Failed to launch '{command}': {reason}")]
    #[diagnostic(
        code(relaunch::spawn::failed),
        help("Check that the command exists and is executable")
    )]
    SpawnFailure { command: String, reason: String },

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("Restart lock error: {0}")]
    #[diagnostic(code(relaunch::lock::error))]
    Lock(String),

    #[error("Watch error: {0}")]
    #[diagnostic(code(relaunch::watch::error))]
    Watch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::RootNotFound { marker, .. } => Some(format!(
                "No '{}' was found. Install dependencies first so the project root can be located.",
                marker
            )),
            Error::PackageManagerUndetected(_) => Some(
                "Run the build through a package manager script, e.g. `npm run dev` or `pnpm dev`."
                    .to_string(),
            ),
            Error::CorruptRecord { path, .. } => Some(format!(
                "The PID file is ignored while corrupt. Delete {} to reset it.",
                path.display()
            )),
            Error::TerminationTimeout { pid, .. } => Some(format!(
                "Process {} is still running. Stop it manually with `kill -9 {}`; the next build will retry.",
                pid, pid
            )),
            Error::SpawnFailure { command, .. } => Some(format!(
                "Verify that '{}' is installed and on PATH.",
                command
            )),
            Error::Lock(_) => Some(
                "Another restart may be in progress. If none is, remove the lock file next to the PID file."
                    .to_string(),
            ),
            Error::Config(_) | Error::Parse(_) | Error::Yaml(_) => {
                Some("Check relaunch.yaml in the project root.".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, context: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for {} (refers to process group, not a process)",
                context
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("refusing to signal PID 1 (init) for {}", context),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for {}, cannot convert safely",
                pid, context
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

/// Same as validate_pid but allows PID 1 for existence checks.
/// Use validate_pid for signal operations; use this for read-only checks.
pub fn validate_pid_for_check(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}

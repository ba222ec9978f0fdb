//! Core configuration types.
//!
//! This module contains the root [`Config`] struct read from `relaunch.yaml`.
//! Every field has a default so an absent file behaves like an empty one.

use super::duration_or;
use crate::supervisor::Phase;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PRIMARY_TARGET: &str = "electron-main";
pub const DEFAULT_STATE_DIR: &str = "node_modules";
pub const DEFAULT_PID_FILE: &str = ".pid";
pub const DEFAULT_LOCK_FILE: &str = ".pid.lock";

const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

/// Root configuration structure for relaunch.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Build target whose first compile is allowed to start the supervised process.
    #[serde(default = "default_primary_target")]
    pub primary_target: String,

    /// Package script to run (`<package manager> run <script>`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Explicit program to launch. Takes precedence over `script`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Build phase that triggers a restart.
    #[serde(default)]
    pub restart_on: Phase,

    /// Directory (relative to the project root) holding the PID and lock files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_pid_file")]
    pub pid_file: String,

    #[serde(default = "default_lock_file")]
    pub lock_file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_lock_after: Option<String>,

    /// Build output directory watched by the artifact event source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<PathBuf>,
}

fn default_primary_target() -> String {
    DEFAULT_PRIMARY_TARGET.to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_pid_file() -> String {
    DEFAULT_PID_FILE.to_string()
}

fn default_lock_file() -> String {
    DEFAULT_LOCK_FILE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_target: default_primary_target(),
            script: None,
            command: None,
            args: Vec::new(),
            restart_on: Phase::default(),
            state_dir: default_state_dir(),
            pid_file: default_pid_file(),
            lock_file: default_lock_file(),
            liveness_timeout: None,
            termination_timeout: None,
            stale_lock_after: None,
            watch: None,
        }
    }
}

impl Config {
    pub fn get_liveness_timeout(&self) -> Duration {
        duration_or(
            "liveness_timeout",
            self.liveness_timeout.as_deref(),
            DEFAULT_LIVENESS_TIMEOUT,
        )
    }

    pub fn get_termination_timeout(&self) -> Duration {
        duration_or(
            "termination_timeout",
            self.termination_timeout.as_deref(),
            DEFAULT_TERMINATION_TIMEOUT,
        )
    }

    pub fn get_stale_lock_after(&self) -> Duration {
        duration_or(
            "stale_lock_after",
            self.stale_lock_after.as_deref(),
            DEFAULT_STALE_LOCK_AFTER,
        )
    }

    /// Absolute path of the PID file for a project rooted at `root`.
    pub fn pid_path(&self, root: &Path) -> PathBuf {
        self.state_path(root).join(&self.pid_file)
    }

    /// Absolute path of the restart lock file, a sibling of the PID file.
    pub fn lock_path(&self, root: &Path) -> PathBuf {
        self.state_path(root).join(&self.lock_file)
    }

    /// Absolute path of the watched artifact directory, if any.
    pub fn watch_path(&self, root: &Path) -> Option<PathBuf> {
        self.watch.as_ref().map(|w| {
            if w.is_absolute() {
                w.clone()
            } else {
                root.join(w)
            }
        })
    }

    fn state_path(&self, root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            root.join(&self.state_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_live_under_node_modules() {
        let config = Config::default();
        let root = Path::new("/work/app");
        assert_eq!(
            config.pid_path(root),
            PathBuf::from("/work/app/node_modules/.pid")
        );
        assert_eq!(
            config.lock_path(root),
            PathBuf::from("/work/app/node_modules/.pid.lock")
        );
    }

    #[test]
    fn test_default_timeouts() {
        let config = Config::default();
        assert_eq!(config.get_liveness_timeout(), Duration::from_secs(2));
        assert_eq!(config.get_termination_timeout(), Duration::from_secs(5));
        assert_eq!(config.get_stale_lock_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_absolute_state_dir_is_kept() {
        let config = Config {
            state_dir: PathBuf::from("/tmp/state"),
            ..Config::default()
        };
        assert_eq!(
            config.pid_path(Path::new("/work/app")),
            PathBuf::from("/tmp/state/.pid")
        );
    }
}

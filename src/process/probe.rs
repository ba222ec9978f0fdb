use crate::error::{validate_pid_for_check, Error, Result};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal;
use std::time::Duration;

/// Default bound on a single liveness query.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers whether a PID currently names a live process.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Query failures and timeouts answer `false`.
    async fn is_alive(&self, pid: u32) -> bool;
}

/// Liveness probe backed by the OS process table.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    timeout: Duration,
}

impl SystemProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_TIMEOUT)
    }
}

#[async_trait]
impl LivenessProbe for SystemProbe {
    async fn is_alive(&self, pid: u32) -> bool {
        match tokio::time::timeout(self.timeout, query_alive(pid)).await {
            Ok(Ok(alive)) => {
                tracing::trace!("PID {} alive: {}", pid, alive);
                alive
            }
            Ok(Err(e)) => {
                tracing::warn!("{}; assuming not alive", e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Liveness query for PID {} timed out after {:?}; assuming not alive",
                    pid,
                    self.timeout
                );
                false
            }
        }
    }
}

/// Ask the OS whether `pid` is a live, non-zombie process.
///
/// ESRCH means gone. EPERM means the process exists but belongs to someone
/// else, which still counts as alive.
pub(crate) async fn query_alive(pid: u32) -> Result<bool> {
    let Some(nix_pid) = validate_pid_for_check(pid) else {
        return Err(Error::LivenessQuery {
            pid,
            reason: "PID is out of range".to_string(),
        });
    };

    match signal::kill(nix_pid, None) {
        Ok(()) | Err(Errno::EPERM) => {}
        Err(Errno::ESRCH) => return Ok(false),
        Err(e) => {
            return Err(Error::LivenessQuery {
                pid,
                reason: e.to_string(),
            })
        }
    }

    match process_state(pid).await {
        Some(state) => Ok(!is_dead_state(state)),
        // The process may have been reaped while the state was being read.
        None => Ok(still_signalable(nix_pid)),
    }
}

/// Second signal-0 check after the state lookup came back empty.
#[cfg(target_os = "linux")]
fn still_signalable(pid: nix::unistd::Pid) -> bool {
    if !std::path::Path::new(&format!("/proc/{}", pid)).exists() {
        return false;
    }
    matches!(signal::kill(pid, None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(target_os = "linux"))]
fn still_signalable(pid: nix::unistd::Pid) -> bool {
    matches!(signal::kill(pid, None), Ok(()) | Err(Errno::EPERM))
}

/// Zombie and dead processes still answer signal 0 but are not running.
fn is_dead_state(state: char) -> bool {
    matches!(state, 'Z' | 'X' | 'x')
}

/// Single-letter scheduler state of `pid`, if it can be read.
#[cfg(target_os = "linux")]
async fn process_state(pid: u32) -> Option<char> {
    let status = tokio::fs::read_to_string(format!("/proc/{}/status", pid))
        .await
        .ok()?;
    // Format: "State:\tZ (zombie)"
    status
        .lines()
        .find(|line| line.starts_with("State:"))
        .and_then(|line| line["State:".len()..].chars().find(|c| c.is_alphabetic()))
}

#[cfg(not(target_os = "linux"))]
async fn process_state(pid: u32) -> Option<char> {
    let output = tokio::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "stat="])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().chars().next()
}

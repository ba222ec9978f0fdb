use super::probe::query_alive;
use crate::error::{validate_pid, Error, Result};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, Signal};
use nix::unistd::{getpgid, Pid};
use std::time::{Duration, Instant};

/// Default bound on waiting for a killed process to disappear.
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Forcibly stops a process together with its descendants.
#[async_trait]
pub trait Terminator: Send + Sync {
    /// Killing a dead or unknown PID is a no-op. Returns
    /// [`Error::TerminationTimeout`] if the process outlives the timeout.
    async fn kill(&self, pid: u32) -> Result<()>;
}

/// Terminator that sends SIGKILL to the process group and every descendant.
#[derive(Debug, Clone)]
pub struct SignalTerminator {
    timeout: Duration,
}

impl SignalTerminator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn send_kill(pid: Pid) {
        match signal::kill(pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::debug!("SIGKILL to PID {} failed: {}", pid, e),
        }
    }

    /// Kill the whole group when `pid` leads one, otherwise only `pid`.
    ///
    /// Never signals the supervisor's own group.
    fn kill_root(pid: Pid) {
        let own_group = getpgid(None).ok();
        match getpgid(Some(pid)) {
            Ok(pgid) if pgid == pid && Some(pgid) != own_group => {
                if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                    tracing::debug!(
                        "killpg failed for PGID {}: {}, trying individual PID",
                        pgid,
                        e
                    );
                    Self::send_kill(pid);
                }
            }
            _ => Self::send_kill(pid),
        }
    }

    async fn wait_for_exit(&self, pid: u32, deadline: Instant) -> Result<()> {
        loop {
            // A failed query counts as exited, same as the liveness probe.
            if !query_alive(pid).await.unwrap_or(false) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::TerminationTimeout {
                    pid,
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Run the process-table scan off the runtime, bounded by `deadline`.
    ///
    /// An unfinished scan yields no descendants; the root is still killed.
    async fn collect_descendants(pid: u32, deadline: Instant) -> Vec<u32> {
        let scan = tokio::task::spawn_blocking(move || descendants_of(pid));
        match tokio::time::timeout_at(deadline.into(), scan).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!("Descendant scan for PID {} failed: {}", pid, e);
                Vec::new()
            }
            Err(_) => {
                tracing::warn!("Descendant scan for PID {} timed out", pid);
                Vec::new()
            }
        }
    }
}

impl Default for SignalTerminator {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATION_TIMEOUT)
    }
}

#[async_trait]
impl Terminator for SignalTerminator {
    #[tracing::instrument(skip(self))]
    async fn kill(&self, pid: u32) -> Result<()> {
        let nix_pid = validate_pid(pid, "the supervised process")?;
        if pid == std::process::id() {
            return Err(Error::InvalidPid {
                pid,
                reason: "refusing to kill the supervisor itself".to_string(),
            });
        }

        if !query_alive(pid).await.unwrap_or(false) {
            tracing::debug!("PID {} is not running, nothing to kill", pid);
            return Ok(());
        }

        let deadline = Instant::now() + self.timeout;

        // Collect before signalling: once the root dies its children are
        // reparented and the parent links are lost.
        let descendants = Self::collect_descendants(pid, deadline).await;

        Self::kill_root(nix_pid);
        for child in &descendants {
            if let Some(child_pid) = crate::error::validate_pid_for_check(*child) {
                Self::send_kill(child_pid);
            }
        }

        self.wait_for_exit(pid, deadline).await?;
        tracing::info!(
            "Killed PID {} ({} descendant(s))",
            pid,
            descendants.len()
        );
        Ok(())
    }
}

/// All transitive children of `root`, read from `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
pub fn descendants_of(root: u32) -> Vec<u32> {
    use std::collections::HashMap;

    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        if let Some(ppid) = read_parent_pid(pid) {
            children.entry(ppid).or_default().push(pid);
        }
    }

    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        if let Some(kids) = children.get(&current) {
            for &kid in kids {
                if kid != root && !found.contains(&kid) {
                    found.push(kid);
                    stack.push(kid);
                }
            }
        }
    }
    found
}

#[cfg(not(target_os = "linux"))]
pub fn descendants_of(root: u32) -> Vec<u32> {
    let Ok(output) = std::process::Command::new("ps")
        .args(["-A", "-o", "pid=,ppid="])
        .output()
    else {
        return Vec::new();
    };

    let pairs: Vec<(u32, u32)> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            Some((pid, ppid))
        })
        .collect();

    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        for &(pid, ppid) in &pairs {
            if ppid == current && pid != root && !found.contains(&pid) {
                found.push(pid);
                stack.push(pid);
            }
        }
    }
    found
}

/// Parent PID from `/proc/<pid>/stat`.
///
/// The command name is in parens and may contain spaces, so parsing starts
/// after the last closing paren: `<state> <ppid> ...`.
#[cfg(target_os = "linux")]
fn read_parent_pid(pid: u32) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let close_paren = stat.rfind(')')?;
    stat.get(close_paren + 2..)?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

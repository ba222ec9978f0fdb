use crate::error::{Error, Result};
use crate::project::LaunchCommand;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Launches the supervised process.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Returns the new PID as soon as the OS has created the process.
    async fn spawn(&self, command: &LaunchCommand) -> Result<u32>;
}

/// Spawner that runs the command with the supervisor's own stdio.
///
/// By default the child gets its own process group so the whole tree can be
/// signalled at once. That group is a background group on the terminal: the
/// child can write to it, but reading from it stops the child with SIGTTIN.
/// Use [`in_caller_group`](Self::in_caller_group) for apps that need terminal
/// input; they are then killed PID by PID instead of as a group.
///
/// The child is not killed when the supervisor drops its handle. A background
/// task reaps it when it exits.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    own_group: bool,
}

impl Default for CommandSpawner {
    fn default() -> Self {
        Self { own_group: true }
    }
}

impl CommandSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the child in the supervisor's process group so it can read the
    /// terminal.
    pub fn in_caller_group() -> Self {
        Self { own_group: false }
    }

    /// Resolve `program` against PATH the way a shell would, relative to `cwd`.
    fn resolve_program(command: &LaunchCommand) -> Result<PathBuf> {
        let search_path = std::env::var_os("PATH");
        which::which_in(&command.program, search_path, &command.cwd).map_err(|e| {
            Error::SpawnFailure {
                command: command.to_string(),
                reason: format!("'{}' not found: {}", command.program, e),
            }
        })
    }
}

#[async_trait]
impl Spawner for CommandSpawner {
    async fn spawn(&self, command: &LaunchCommand) -> Result<u32> {
        let program = Self::resolve_program(command)?;

        tracing::debug!(
            "Spawning '{}' ({}) in {}",
            command,
            program.display(),
            command.cwd.display()
        );

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        #[cfg(unix)]
        if self.own_group {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(
                "Failed to spawn '{}': {} (cwd: {:?})",
                command,
                e,
                command.cwd
            );
            Error::SpawnFailure {
                command: command.to_string(),
                reason: e.to_string(),
            }
        })?;

        let Some(pid) = child.id() else {
            return Err(Error::SpawnFailure {
                command: command.to_string(),
                reason: "process exited before its PID could be read".to_string(),
            });
        };

        let label = command.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!("'{}' (PID {}) exited: {}", label, pid, status),
                Err(e) => tracing::warn!("Failed to wait for '{}' (PID {}): {}", label, pid, e),
            }
        });

        tracing::info!("Started '{}' as PID {}", command, pid);
        Ok(pid)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::{LivenessProbe, SystemProbe};

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let cmd = LaunchCommand::new("relaunch-no-such-program", vec![], "/");
        let err = CommandSpawner::new().spawn(&cmd).await.unwrap_err();
        assert!(matches!(err, Error::SpawnFailure { .. }));
    }

    #[tokio::test]
    async fn test_spawned_process_is_alive_and_own_group_leader() {
        let cmd = LaunchCommand::new("sleep", vec!["30".to_string()], "/");
        let pid = CommandSpawner::new().spawn(&cmd).await.unwrap();

        assert!(SystemProbe::default().is_alive(pid).await);
        let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(pid as i32))).unwrap();
        assert_eq!(pgid.as_raw() as u32, pid);

        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGKILL,
        );
    }

    #[tokio::test]
    async fn test_caller_group_child_shares_our_group() {
        let cmd = LaunchCommand::new("sleep", vec!["30".to_string()], "/");
        let pid = CommandSpawner::in_caller_group().spawn(&cmd).await.unwrap();

        let child_pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(pid as i32))).unwrap();
        assert_eq!(child_pgid, nix::unistd::getpgid(None).unwrap());

        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGKILL,
        );
    }
}

use crate::error::{validate_pid_for_check, Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Default age after which a lock held by a dead owner may be cleared.
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

/// Mutual exclusion for the restart sequence, backed by an advisory file lock.
///
/// The OS drops the lock when the holder's file handle is closed, including
/// when the holder crashes, so a leftover record never blocks anyone. The
/// holder records `"<pid> <rfc3339>"` in the file so contention can be
/// diagnosed.
///
/// A held lock is only bypassed when the handle outlived the process that
/// took it (a forked child kept the descriptor): the recorded owner is dead,
/// the record is older than `stale_after`, and on Linux the kernel's lock
/// table reports no live creator for this file. Elsewhere a held lock is
/// never bypassed.
#[derive(Debug, Clone)]
pub struct RestartLock {
    path: PathBuf,
    stale_after: Duration,
}

/// Exclusive ownership of the restart critical section.
///
/// Released on drop, so every path out of the critical section releases it.
#[derive(Debug)]
pub struct LockHandle {
    file: File,
    path: PathBuf,
}

/// Who holds (or last held) the lock, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    fn parse(content: &str) -> Option<Self> {
        let mut fields = content.split_whitespace();
        let pid = fields.next()?.parse().ok()?;
        let acquired_at = fields.next()?.parse::<DateTime<Utc>>().ok()?;
        Some(Self { pid, acquired_at })
    }
}

impl RestartLock {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` when another restart holds it.
    pub fn try_acquire(&self) -> Result<Option<LockHandle>> {
        if let Some(handle) = self.try_lock_once()? {
            return Ok(Some(handle));
        }

        if let Some(owner) = self.stale_owner() {
            warn!(
                "Clearing stale restart lock {} held by dead PID {} since {}",
                self.path.display(),
                owner.pid,
                owner.acquired_at
            );
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Lock(format!(
                        "Failed to remove stale lock {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
            return self.try_lock_once();
        }

        Ok(None)
    }

    /// Current owner record, if the lock file holds a readable one.
    pub fn owner(&self) -> Option<LockOwner> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| LockOwner::parse(&content))
    }

    fn try_lock_once(&self) -> Result<Option<LockHandle>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Lock(format!(
                    "Failed to create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::Lock(format!("Failed to open lock file: {}", e)))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = file.set_len(0);
                let _ = writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339());
                debug!("Acquired restart lock {}", self.path.display());
                Ok(Some(LockHandle {
                    file,
                    path: self.path.clone(),
                }))
            }
            Err(e) if is_contended(&e) => {
                debug!("Restart lock {} is held: {}", self.path.display(), e);
                Ok(None)
            }
            Err(e) => Err(Error::Lock(format!(
                "Failed to lock {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// The recorded owner, if it is dead and the record older than `stale_after`.
    ///
    /// A lock held by this same process is never stale: that is a concurrent
    /// trigger in flight.
    fn stale_owner(&self) -> Option<LockOwner> {
        let owner = self.owner()?;
        if owner.pid == std::process::id() || owner_alive(owner.pid) {
            return None;
        }
        let age = Utc::now().signed_duration_since(owner.acquired_at);
        let age = age.to_std().unwrap_or(Duration::ZERO);
        if age <= self.stale_after {
            return None;
        }
        // A new holder may have taken the lock and not yet rewritten the
        // record; it shows up as a live creator in the lock table.
        if !self.holders_all_dead() {
            debug!(
                "Restart lock {} has a live holder despite stale record of PID {}",
                self.path.display(),
                owner.pid
            );
            return None;
        }
        Some(owner)
    }

    #[cfg(target_os = "linux")]
    fn holders_all_dead(&self) -> bool {
        use std::os::unix::fs::MetadataExt;

        let Ok(meta) = std::fs::metadata(&self.path) else {
            return false;
        };
        let Ok(table) = std::fs::read_to_string("/proc/locks") else {
            return false;
        };
        let holders = flock_holders(&table, meta.ino());
        !holders.is_empty() && holders.iter().all(|pid| !owner_alive(*pid))
    }

    #[cfg(not(target_os = "linux"))]
    fn holders_all_dead(&self) -> bool {
        false
    }
}

/// Creator PIDs of the flock locks on inode `ino` in a `/proc/locks` dump.
///
/// Lines look like `1: FLOCK  ADVISORY  WRITE 1234 08:01:5678 0 EOF`; blocked
/// waiters carry a `->` marker and are skipped. The kernel shows 0 when the
/// creator no longer exists.
#[cfg(target_os = "linux")]
fn flock_holders(table: &str, ino: u64) -> Vec<u32> {
    table
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.get(1) != Some(&"FLOCK") {
                return None;
            }
            let pid = fields.get(4)?.parse::<u32>().ok()?;
            let inode = fields.get(5)?.rsplit(':').next()?.parse::<u64>().ok()?;
            (inode == ino).then_some(pid)
        })
        .collect()
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly. Dropping the handle has the same effect.
    pub fn release(self) {}
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        } else {
            debug!("Released restart lock {}", self.path.display());
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn owner_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    match validate_pid_for_check(pid) {
        Some(nix_pid) => matches!(kill(nix_pid, None), Ok(()) | Err(Errno::EPERM)),
        None => false,
    }
}

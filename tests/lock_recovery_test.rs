//! Restart lock contention and stale-owner recovery.

use chrono::{Duration as ChronoDuration, Utc};
use relaunch::RestartLock;
use std::time::Duration;
use tempfile::TempDir;

/// Above the default pid_max, so never a live process.
const DEAD_PID: u32 = i32::MAX as u32 - 11;

fn record(path: &std::path::Path, pid: u32, age: ChronoDuration) {
    let at = (Utc::now() - age).to_rfc3339();
    std::fs::write(path, format!("{} {}\n", pid, at)).unwrap();
}

#[test]
fn test_live_holder_is_never_bypassed_by_old_dead_record() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".pid.lock");
    let lock = RestartLock::new(&path, Duration::from_secs(30));

    // A holder that has taken the lock but not yet rewritten the leftover
    // record of a long-dead owner.
    let held = lock.try_acquire().unwrap().unwrap();
    record(&path, DEAD_PID, ChronoDuration::seconds(120));

    assert!(lock.try_acquire().unwrap().is_none());
    assert!(lock.try_acquire().unwrap().is_none());
    assert!(path.exists());
    assert_eq!(lock.owner().unwrap().pid, DEAD_PID);

    drop(held);
    assert!(lock.try_acquire().unwrap().is_some());
}

#[test]
fn test_recent_dead_owner_is_not_cleared() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".pid.lock");
    let lock = RestartLock::new(&path, Duration::from_secs(30));

    let _held = lock.try_acquire().unwrap().unwrap();
    record(&path, DEAD_PID, ChronoDuration::seconds(1));

    assert!(lock.try_acquire().unwrap().is_none());
    assert_eq!(lock.owner().unwrap().pid, DEAD_PID);
}

#[test]
fn test_leftover_file_from_crashed_holder_does_not_block() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("node_modules").join(".pid.lock");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    // The OS released the crashed holder's lock; only its record remains.
    record(&path, DEAD_PID, ChronoDuration::seconds(5));

    let lock = RestartLock::new(&path, Duration::from_secs(30));
    let handle = lock.try_acquire().unwrap();
    assert!(handle.is_some());
    assert_eq!(lock.owner().unwrap().pid, std::process::id());
}

#[test]
fn test_release_clears_owner_record() {
    let temp = TempDir::new().unwrap();
    let lock = RestartLock::new(temp.path().join(".pid.lock"), Duration::from_secs(30));

    let handle = lock.try_acquire().unwrap().unwrap();
    assert!(lock.owner().is_some());
    handle.release();
    assert!(lock.owner().is_none());
}

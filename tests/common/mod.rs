//! In-memory process table shared by the supervisor integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relaunch::{
    Config, Error, FixedCommand, LaunchCommand, LivenessProbe, Result, Spawner, Supervisor,
    SupervisorBuilder, Terminator,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const FIRST_FAKE_PID: u32 = 40_000;

#[derive(Default)]
struct TableState {
    live: HashSet<u32>,
    stuck: HashSet<u32>,
    next_pid: u32,
    spawned: Vec<u32>,
    killed: Vec<u32>,
    spawn_calls: usize,
}

/// A fake OS: which PIDs are live, and what was spawned and killed.
#[derive(Clone, Default)]
pub struct ProcessTable {
    inner: Arc<Mutex<TableState>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        let table = Self::default();
        table.inner.lock().next_pid = FIRST_FAKE_PID;
        table
    }

    pub fn add_live(&self, pid: u32) {
        self.inner.lock().live.insert(pid);
    }

    /// `pid` survives SIGKILL, as a process in uninterruptible sleep would.
    pub fn make_stuck(&self, pid: u32) {
        self.inner.lock().stuck.insert(pid);
    }

    pub fn is_live(&self, pid: u32) -> bool {
        self.inner.lock().live.contains(&pid)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn spawned(&self) -> Vec<u32> {
        self.inner.lock().spawned.clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.inner.lock().killed.clone()
    }

    pub fn spawn_calls(&self) -> usize {
        self.inner.lock().spawn_calls
    }
}

pub struct FakeProbe(pub ProcessTable);

#[async_trait]
impl LivenessProbe for FakeProbe {
    async fn is_alive(&self, pid: u32) -> bool {
        self.0.is_live(pid)
    }
}

pub struct FakeTerminator(pub ProcessTable);

#[async_trait]
impl Terminator for FakeTerminator {
    async fn kill(&self, pid: u32) -> Result<()> {
        let mut state = self.0.inner.lock();
        if state.stuck.contains(&pid) {
            return Err(Error::TerminationTimeout {
                pid,
                timeout: Duration::from_millis(10),
            });
        }
        if state.live.remove(&pid) {
            state.killed.push(pid);
        }
        Ok(())
    }
}

/// Allocates PIDs from the table; can be slowed down or made to fail.
pub struct FakeSpawner {
    table: ProcessTable,
    delay: Duration,
    fail: bool,
}

impl FakeSpawner {
    pub fn new(table: ProcessTable) -> Self {
        Self {
            table,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Spawner for FakeSpawner {
    async fn spawn(&self, command: &LaunchCommand) -> Result<u32> {
        self.table.inner.lock().spawn_calls += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::SpawnFailure {
                command: command.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        let mut state = self.table.inner.lock();
        let pid = state.next_pid;
        state.next_pid += 1;
        state.live.insert(pid);
        state.spawned.push(pid);
        Ok(pid)
    }
}

/// Builder wired to `table`, launching a fixed `electron .`.
pub fn fake_builder(root: &Path, table: &ProcessTable, spawner: FakeSpawner) -> SupervisorBuilder {
    Supervisor::builder(root, Config::default())
        .probe(Arc::new(FakeProbe(table.clone())))
        .terminator(Arc::new(FakeTerminator(table.clone())))
        .spawner(Arc::new(spawner))
        .command_source(FixedCommand::new("electron", vec![".".to_string()]))
}

pub fn fake_supervisor(root: &Path, table: &ProcessTable) -> Supervisor {
    fake_builder(root, table, FakeSpawner::new(table.clone()))
        .build()
        .unwrap()
}

pub fn pid_file(root: &Path) -> std::path::PathBuf {
    root.join("node_modules").join(".pid")
}

pub fn read_pid_file(root: &Path) -> String {
    std::fs::read_to_string(pid_file(root)).unwrap()
}

use super::{EventSource, LifecycleEvent, Phase, RestartAction, RestartPolicy, StandardPolicy};
use crate::config::{Config, Parser};
use crate::error::{Error, Result};
use crate::process::{
    CommandSpawner, LivenessProbe, PidStore, RestartLock, SignalTerminator, Spawner, SystemProbe,
    Terminator,
};
use crate::project::{command_source_from_config, find_project_root, CommandSource, PackageManager};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `shutdown` keeps retrying while an in-flight restart holds the lock.
const SHUTDOWN_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Where the supervisor is in a restart sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    #[default]
    Idle,
    Locked,
    Terminating,
    Spawning,
    SkipSpawn,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Locked => "locked",
            SupervisorState::Terminating => "terminating",
            SupervisorState::Spawning => "spawning",
            SupervisorState::SkipSpawn => "skip-spawn",
        };
        f.write_str(s)
    }
}

/// Result of handling one lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// The policy said to do nothing.
    Skipped,
    /// Another restart sequence was in flight and stands in for this one.
    Coalesced,
    /// The previous process (if it was live) was killed and nothing replaced it.
    Stopped { terminated: Option<u32> },
    /// A new process was started.
    Restarted { terminated: Option<u32>, pid: u32 },
}

/// Restarts one supervised process per project in response to build events.
///
/// All methods take `&self`; concurrent calls to [`handle_event`](Self::handle_event)
/// are serialized by the restart lock, and a call that finds the lock held
/// returns [`RestartOutcome::Coalesced`] immediately.
pub struct Supervisor {
    root: PathBuf,
    store: PidStore,
    lock: RestartLock,
    policy: Arc<dyn RestartPolicy>,
    commands: Arc<dyn CommandSource>,
    probe: Arc<dyn LivenessProbe>,
    terminator: Arc<dyn Terminator>,
    spawner: Arc<dyn Spawner>,
    shutdown_timeout: Duration,
    state: Mutex<SupervisorState>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("root", &self.root)
            .field("pid_file", &self.store.path())
            .field("lock_file", &self.lock.path())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Supervisor {
    /// Supervisor for the project at `root` with the real OS components.
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        SupervisorBuilder::new(root, config).build()
    }

    /// Builder for injecting a custom policy, command source or OS components.
    pub fn builder(root: impl Into<PathBuf>, config: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(root, config)
    }

    /// Locate the project root from `start` and load its `relaunch.yaml`.
    ///
    /// The root is the nearest directory holding the invoking package
    /// manager's lockfile, or any known lockfile when the package manager
    /// cannot be detected. Fails with `RootNotFound` when there is none.
    pub fn discover(start: &Path) -> Result<Self> {
        let markers: Vec<&str> = match PackageManager::detect() {
            Ok(manager) => vec![manager.lockfile()],
            Err(e) => {
                debug!("{}; searching for any known lockfile", e);
                [PackageManager::Npm, PackageManager::Pnpm, PackageManager::Yarn]
                    .iter()
                    .map(|m| m.lockfile())
                    .collect()
            }
        };
        let root = find_project_root(start, &markers)?;
        let config = Parser::new().load_or_default(&root)?;
        Self::new(root, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    /// PID of the supervised process as currently recorded.
    pub fn recorded_pid(&self) -> Result<Option<u32>> {
        self.store.load()
    }

    /// Handle one lifecycle event.
    ///
    /// Errors leave the supervisor idle with the lock released. After a
    /// termination timeout the PID record is unchanged; after a spawn failure
    /// it is cleared. A process that was spawned but could not be recorded is
    /// stopped again.
    #[tracing::instrument(skip(self, event), fields(phase = %event.phase, target = %event.build_target))]
    pub async fn handle_event(&self, event: &LifecycleEvent) -> Result<RestartOutcome> {
        let action = self.policy.decide(event);
        if action == RestartAction::Skip {
            debug!(
                "Policy skips event (first_compile={}, watch={})",
                event.is_first_compile, event.is_watch_mode
            );
            return Ok(RestartOutcome::Skipped);
        }

        let Some(guard) = self.lock.try_acquire()? else {
            info!("Restart already in progress, coalescing this trigger");
            return Ok(RestartOutcome::Coalesced);
        };

        self.set_state(SupervisorState::Locked);
        let result = self.restart_sequence(action).await;
        self.set_state(SupervisorState::Idle);
        guard.release();

        match &result {
            Ok(outcome) => debug!("Restart sequence finished: {:?}", outcome),
            Err(e) => warn!("Restart sequence aborted: {}", e),
        }
        result
    }

    async fn restart_sequence(&self, action: RestartAction) -> Result<RestartOutcome> {
        // Resolve before touching anything so that a failure mutates nothing.
        let command = match action {
            RestartAction::Replace => Some(self.commands.resolve(&self.root)?),
            _ => None,
        };

        self.set_state(SupervisorState::Terminating);
        let previous = self.store.load()?;
        let mut terminated = None;
        if let Some(pid) = previous {
            if self.probe.is_alive(pid).await {
                info!("Stopping previous process (PID {})", pid);
                match self.terminator.kill(pid).await {
                    Ok(()) => terminated = Some(pid),
                    // A reused PID now naming init or the supervisor itself is
                    // not the supervised process; drop the record instead.
                    Err(e @ Error::InvalidPid { .. }) => {
                        warn!("Ignoring recorded PID {}: {}", pid, e);
                    }
                    Err(e) => return Err(e),
                }
            } else {
                debug!("Recorded PID {} is not running", pid);
            }
        }

        let Some(command) = command else {
            self.set_state(SupervisorState::SkipSpawn);
            // Also overwrites a corrupt record.
            self.store.clear()?;
            return Ok(RestartOutcome::Stopped { terminated });
        };

        self.set_state(SupervisorState::Spawning);
        match self.spawner.spawn(&command).await {
            Ok(pid) => {
                if let Err(e) = self.store.write(pid) {
                    // An unrecorded instance would never be replaced.
                    error!("Failed to record PID {}, stopping it: {}", pid, e);
                    if let Err(kill_err) = self.terminator.kill(pid).await {
                        warn!("Failed to stop unrecorded PID {}: {}", pid, kill_err);
                    }
                    return Err(e);
                }
                Ok(RestartOutcome::Restarted { terminated, pid })
            }
            Err(e) => {
                error!("Failed to start '{}': {}", command, e);
                if let Err(clear_err) = self.store.clear() {
                    warn!("Failed to clear PID record after spawn failure: {}", clear_err);
                }
                Err(e)
            }
        }
    }

    /// Best-effort teardown: kill the supervised process, never spawn.
    ///
    /// If a restart is in flight the shutdown is retried until the lock frees
    /// up or the termination timeout passes, so the process that restart
    /// spawns is not left behind. Failures are logged, not returned.
    pub async fn shutdown(&self) -> Option<RestartOutcome> {
        let event = LifecycleEvent::shutdown();
        let started = Instant::now();
        loop {
            match self.handle_event(&event).await {
                Ok(RestartOutcome::Coalesced) if started.elapsed() < self.shutdown_timeout => {
                    tokio::time::sleep(SHUTDOWN_RETRY_INTERVAL).await;
                }
                Ok(outcome) => {
                    info!("Shutdown complete: {:?}", outcome);
                    return Some(outcome);
                }
                Err(e) => {
                    error!("Shutdown could not stop the supervised process: {}", e.with_suggestion());
                    return None;
                }
            }
        }
    }

    /// Consume events until the source closes, a shutdown event arrives, or
    /// `cancel` fires. All three end with [`shutdown`](Self::shutdown).
    ///
    /// Errors from individual events are logged and do not stop the loop.
    pub async fn run<S: EventSource + ?Sized>(&self, source: &mut S, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Supervisor cancelled");
                    break;
                }
                event = source.next_event() => event,
            };

            let Some(event) = event else {
                debug!("Event source closed");
                break;
            };

            if event.phase == Phase::Shutdown {
                break;
            }

            if let Err(e) = self.handle_event(&event).await {
                error!("{}", e.with_suggestion());
            }
        }

        self.shutdown().await;
    }

    fn set_state(&self, state: SupervisorState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("{} -> {}", *current, state);
            *current = state;
        }
    }
}

/// Builder for [`Supervisor`].
///
/// Defaults come from the [`Config`]: the standard policy for its primary
/// target, the command it describes, and OS-backed components with its
/// timeouts. `build` also creates the empty PID file if it is missing.
pub struct SupervisorBuilder {
    root: PathBuf,
    config: Config,
    policy: Option<Arc<dyn RestartPolicy>>,
    commands: Option<Arc<dyn CommandSource>>,
    probe: Option<Arc<dyn LivenessProbe>>,
    terminator: Option<Arc<dyn Terminator>>,
    spawner: Option<Arc<dyn Spawner>>,
}

impl SupervisorBuilder {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
            policy: None,
            commands: None,
            probe: None,
            terminator: None,
            spawner: None,
        }
    }

    pub fn policy(mut self, policy: impl RestartPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn command_source(mut self, commands: impl CommandSource + 'static) -> Self {
        self.commands = Some(Arc::new(commands));
        self
    }

    pub fn probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn build(self) -> Result<Supervisor> {
        let config = self.config;
        let store = PidStore::new(config.pid_path(&self.root));
        store.initialize()?;

        let lock = RestartLock::new(config.lock_path(&self.root), config.get_stale_lock_after());

        let policy = self.policy.unwrap_or_else(|| {
            Arc::new(StandardPolicy::new(
                config.primary_target.clone(),
                config.restart_on,
            ))
        });
        let commands = self
            .commands
            .unwrap_or_else(|| Arc::from(command_source_from_config(&config)));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SystemProbe::new(config.get_liveness_timeout())));
        let terminator = self.terminator.unwrap_or_else(|| {
            Arc::new(SignalTerminator::new(config.get_termination_timeout()))
        });
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(CommandSpawner::new()));

        debug!(
            "Supervisor for {} (pid file {}, lock file {})",
            self.root.display(),
            store.path().display(),
            lock.path().display()
        );

        Ok(Supervisor {
            root: self.root,
            store,
            lock,
            policy,
            commands,
            probe,
            terminator,
            spawner,
            shutdown_timeout: config.get_termination_timeout(),
            state: Mutex::new(SupervisorState::Idle),
        })
    }
}

//! # Relaunch
//!
//! Keeps exactly one instance of a development process (typically an Electron
//! app) running across build-watch cycles, restarting it after each rebuild.
//!
//! ## Features
//!
//! - **Single instance**: the PID of the running app is persisted under the
//!   project's `node_modules`, so every restart kills the previous instance
//!   even across host restarts
//! - **Coalescing**: concurrent triggers never start two instances; a trigger
//!   that arrives during a restart is absorbed by it
//! - **Whole-tree kill**: the app's process group and descendants are killed
//!   with `SIGKILL` and confirmed dead before a replacement starts
//! - **Host agnostic**: events arrive through an [`EventSource`], either a
//!   channel fed from build hooks or an [`ArtifactWatchSource`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use relaunch::{event_channel, LifecycleEvent, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), relaunch::Error> {
//! relaunch::logging::init_tracing("info");
//!
//! // Finds the project root from the package manager's lockfile and loads
//! // relaunch.yaml when present.
//! let supervisor = Supervisor::discover(&std::env::current_dir()?)?;
//!
//! let (events, mut source) = event_channel();
//! // From the build host's "done" hook:
//! events.send(LifecycleEvent::post_build("electron-main", true, true));
//!
//! supervisor.run(&mut source, CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - [`Supervisor`] methods take `&self`; share it behind an `Arc`
//! - Restart sequences are serialized by an advisory file lock next to the
//!   PID file, which also excludes other supervisors of the same project
//! - A trigger that finds the lock held returns immediately as coalesced

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod project;
pub mod supervisor;
pub mod watch;

// Re-export commonly used types
pub use config::{Config, Parser};
pub use error::{Error, Result};
pub use process::{
    CommandSpawner, LivenessProbe, PidStore, RestartLock, SignalTerminator, Spawner, SystemProbe,
    Terminator,
};
pub use project::{
    find_project_root, CommandSource, FixedCommand, LaunchCommand, PackageEntry, PackageManager,
    PackageScript,
};
pub use supervisor::{
    event_channel, ChannelEventSource, EventSender, EventSource, LifecycleEvent, Phase,
    RestartAction, RestartOutcome, RestartPolicy, StandardPolicy, Supervisor, SupervisorBuilder,
    SupervisorState,
};
pub use watch::ArtifactWatchSource;

//! OS-facing building blocks of the supervisor.
//!
//! - [`PidStore`]: the persisted PID of the supervised process
//! - [`LivenessProbe`] / [`SystemProbe`]: is a PID a running process?
//! - [`Terminator`] / [`SignalTerminator`]: kill a process tree, idempotently
//! - [`Spawner`] / [`CommandSpawner`]: launch with inherited stdio
//! - [`RestartLock`] / [`LockHandle`]: one restart sequence at a time
//!
//! The traits are the seams the supervisor is built against, so tests can
//! substitute an in-memory process table.

mod lock;
mod probe;
mod spawner;
mod store;
mod terminator;

pub use lock::*;
pub use probe::{LivenessProbe, SystemProbe, DEFAULT_LIVENESS_TIMEOUT};
pub use spawner::*;
pub use store::*;
pub use terminator::*;

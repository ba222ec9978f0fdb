//! Restart orchestration.
//!
//! A [`Supervisor`] turns [`LifecycleEvent`]s from a build host into at most
//! one running instance of the app: the [`RestartPolicy`] picks an action,
//! the restart lock serializes sequences, and the process layer does the
//! killing and spawning.

mod core;
mod event;
mod policy;

pub use self::core::*;
pub use event::*;
pub use policy::*;

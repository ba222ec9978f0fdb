use super::{LifecycleEvent, Phase};
use std::fmt;

/// What a restart sequence should do for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartAction {
    /// Kill the previous process (if live) and spawn a replacement.
    Replace,
    /// Kill the previous process (if live) and leave nothing running.
    TerminateOnly,
    /// Do nothing; the lock is not even taken.
    Skip,
}

impl fmt::Display for RestartAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartAction::Replace => "replace",
            RestartAction::TerminateOnly => "terminate-only",
            RestartAction::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Decides, per event, what the restart sequence does.
///
/// Any `Fn(&LifecycleEvent) -> RestartAction` is a policy, so a host can
/// override [`StandardPolicy`] with a closure.
pub trait RestartPolicy: Send + Sync {
    fn decide(&self, event: &LifecycleEvent) -> RestartAction;
}

impl<F> RestartPolicy for F
where
    F: Fn(&LifecycleEvent) -> RestartAction + Send + Sync,
{
    fn decide(&self, event: &LifecycleEvent) -> RestartAction {
        self(event)
    }
}

/// The default policy.
///
/// - shutdown: terminate only
/// - a build phase other than `trigger`: skip
/// - first compile of a non-primary target: skip (no kill either)
/// - not in watch mode: terminate only
/// - otherwise: replace
#[derive(Debug, Clone)]
pub struct StandardPolicy {
    primary_target: String,
    trigger: Phase,
}

impl StandardPolicy {
    pub fn new(primary_target: impl Into<String>, trigger: Phase) -> Self {
        Self {
            primary_target: primary_target.into(),
            trigger,
        }
    }

    pub fn primary_target(&self) -> &str {
        &self.primary_target
    }
}

impl RestartPolicy for StandardPolicy {
    fn decide(&self, event: &LifecycleEvent) -> RestartAction {
        if event.phase == Phase::Shutdown {
            return RestartAction::TerminateOnly;
        }
        if event.phase != self.trigger {
            return RestartAction::Skip;
        }
        if event.is_first_compile && event.build_target != self.primary_target {
            return RestartAction::Skip;
        }
        if !event.is_watch_mode {
            return RestartAction::TerminateOnly;
        }
        RestartAction::Replace
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Phase of the host build a [`LifecycleEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PreBuild,
    #[default]
    PostBuild,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::PreBuild => "pre-build",
            Phase::PostBuild => "post-build",
            Phase::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A build host event, consumed once by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: Phase,
    pub is_first_compile: bool,
    pub is_watch_mode: bool,
    pub build_target: String,
}

impl LifecycleEvent {
    pub fn pre_build(build_target: impl Into<String>, is_first_compile: bool, is_watch_mode: bool) -> Self {
        Self {
            phase: Phase::PreBuild,
            is_first_compile,
            is_watch_mode,
            build_target: build_target.into(),
        }
    }

    pub fn post_build(build_target: impl Into<String>, is_first_compile: bool, is_watch_mode: bool) -> Self {
        Self {
            phase: Phase::PostBuild,
            is_first_compile,
            is_watch_mode,
            build_target: build_target.into(),
        }
    }

    pub fn shutdown() -> Self {
        Self {
            phase: Phase::Shutdown,
            is_first_compile: false,
            is_watch_mode: false,
            build_target: String::new(),
        }
    }
}

/// Where lifecycle events come from.
///
/// This is the only thing the supervisor needs from a build host.
#[async_trait]
pub trait EventSource: Send {
    /// `None` once the host will deliver no more events.
    async fn next_event(&mut self) -> Option<LifecycleEvent>;
}

/// Receiving half of [`event_channel`].
#[derive(Debug)]
pub struct ChannelEventSource {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

/// Sending half of [`event_channel`], for hosts with callback hooks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EventSender {
    /// Returns `false` if the supervisor is no longer listening.
    pub fn send(&self, event: LifecycleEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Create a channel-backed event source.
pub fn event_channel() -> (EventSender, ChannelEventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, ChannelEventSource { rx })
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }
}

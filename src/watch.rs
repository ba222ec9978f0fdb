//! Build-output watching as an event source.
//!
//! For build hosts without callback hooks: [`ArtifactWatchSource`] watches the
//! directory the build writes to and reports each settled burst of changes as
//! a post-build event of the configured target, in watch mode.
//!
//! ```ignore
//! use relaunch::{ArtifactWatchSource, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! let supervisor = Supervisor::discover(&std::env::current_dir()?)?;
//! let config = relaunch::Parser::new().load_or_default(supervisor.root())?;
//! let mut source = ArtifactWatchSource::from_config(supervisor.root(), &config)?;
//! supervisor.run(&mut source, CancellationToken::new()).await;
//! ```

use crate::config::Config;
use crate::error::{Error, Result};
use crate::supervisor::{EventSource, LifecycleEvent};
use async_trait::async_trait;
use notify_debouncer_full::{
    new_debouncer,
    notify::{RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Bundlers often write several files per rebuild; wait for them to settle.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Emits a post-build event whenever the watched output directory changes.
///
/// The first event is reported as the first compile. The watcher stops when
/// the source is dropped.
pub struct ArtifactWatchSource {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    change_rx: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    dir: PathBuf,
    target: String,
    first: bool,
}

impl std::fmt::Debug for ArtifactWatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWatchSource")
            .field("dir", &self.dir)
            .field("target", &self.target)
            .field("first", &self.first)
            .finish()
    }
}

impl ArtifactWatchSource {
    pub fn new(dir: impl Into<PathBuf>, target: impl Into<String>) -> Result<Self> {
        Self::with_debounce(dir, target, DEFAULT_DEBOUNCE)
    }

    /// Watch the `watch` directory of `config`, reporting its primary target.
    ///
    /// Fails with a config error when no `watch` directory is set.
    pub fn from_config(root: &Path, config: &Config) -> Result<Self> {
        let dir = config.watch_path(root).ok_or_else(|| {
            Error::Config("No 'watch' directory set in relaunch.yaml".to_string())
        })?;
        Self::new(dir, config.primary_target.clone())
    }

    /// Like [`new`](Self::new) with a custom settle time.
    pub fn with_debounce(
        dir: impl Into<PathBuf>,
        target: impl Into<String>,
        debounce: Duration,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Watch(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let (change_tx, change_rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let changed: Vec<PathBuf> = events
                        .iter()
                        .flat_map(|event| event.paths.iter())
                        .filter(|path| !should_ignore_path(path))
                        .cloned()
                        .collect();
                    if !changed.is_empty() {
                        let _ = change_tx.send(changed);
                    }
                }
                Err(errors) => {
                    tracing::warn!("Watch error: {:?}", errors);
                }
            }
        })
        .map_err(|e| Error::Watch(format!("Failed to create file watcher: {}", e)))?;

        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(format!("Failed to watch {}: {}", dir.display(), e)))?;

        tracing::debug!("Watching build output {}", dir.display());

        Ok(Self {
            _debouncer: debouncer,
            change_rx,
            dir,
            target: target.into(),
            first: true,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl EventSource for ArtifactWatchSource {
    async fn next_event(&mut self) -> Option<LifecycleEvent> {
        let changed = self.change_rx.recv().await?;
        tracing::debug!("{} output file(s) changed", changed.len());

        let is_first_compile = std::mem::replace(&mut self.first, false);
        Some(LifecycleEvent::post_build(
            self.target.clone(),
            is_first_compile,
            true,
        ))
    }
}

/// Editor swap files and OS metadata, never build output.
fn should_ignore_path(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    if name == ".DS_Store" || name == "Thumbs.db" || name.ends_with('~') {
        return true;
    }

    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("swp" | "swo" | "swx" | "tmp")
    )
}

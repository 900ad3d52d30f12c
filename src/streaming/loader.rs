//! Background manifest loading
//!
//! Building a source from a large manifest is blocking work (YAML parsing and
//! per-tile geometry), so it runs on tokio's blocking pool while progress is
//! published on a `watch` channel for UI or logging consumers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::{Error, Result, SourceConfig};
use crate::volume::ManifestVolumeSource;

/// Observable state of a background source build
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    NotStarted,
    /// Build running, percent complete (always below 100)
    Parsing(u8),
    Ready,
    Failed(String),
}

impl LoadState {
    /// True once the build has succeeded or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Failed(_))
    }

    /// Progress percentage implied by this state
    pub fn percent(&self) -> u8 {
        match self {
            LoadState::NotStarted | LoadState::Failed(_) => 0,
            LoadState::Parsing(p) => *p,
            LoadState::Ready => 100,
        }
    }
}

/// Handle to a manifest build running in the background
#[derive(Debug)]
pub struct SourceLoader {
    path: PathBuf,
    state_rx: watch::Receiver<LoadState>,
    handle: JoinHandle<Result<ManifestVolumeSource>>,
}

impl SourceLoader {
    /// Start building a source from the manifest at `path`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, config: SourceConfig) -> Self {
        let path = path.into();
        let (state_tx, state_rx) = watch::channel(LoadState::NotStarted);

        let task_path = path.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut publish = |percent: u8| {
                // 100 is only ever published as Ready
                if percent < 100 {
                    state_tx.send_replace(LoadState::Parsing(percent));
                }
            };
            let result = ManifestVolumeSource::from_path(&task_path, &config, &mut publish);
            match &result {
                Ok(source) => {
                    log::info!("Volume source ready: {} tiles from {}", source.tile_count(), task_path.display());
                    state_tx.send_replace(LoadState::Ready);
                }
                Err(e) => {
                    log::error!("Failed to load volume manifest {}: {}", task_path.display(), e);
                    state_tx.send_replace(LoadState::Failed(e.to_string()));
                }
            }
            result
        });

        Self { path, state_rx, handle }
    }

    /// Manifest being loaded
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Latest published state
    pub fn state(&self) -> LoadState {
        self.state_rx.borrow().clone()
    }

    /// A receiver that observes state changes independently of this handle
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the build if it has not started running yet
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the build to finish
    pub async fn wait(self) -> Result<Arc<ManifestVolumeSource>> {
        match self.handle.await {
            Ok(result) => result.map(Arc::new),
            Err(e) => {
                log::warn!("Volume source build for {} did not complete: {}", self.path.display(), e);
                Err(Error::Cancelled)
            }
        }
    }
}

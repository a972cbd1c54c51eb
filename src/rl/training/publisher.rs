//! Result Publishing
//!
//! Ships results to an external system without blocking training.
//! Publishing failures never abort a run.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::checkpointing::CheckpointPaths;
use crate::rl::config::PublishMode;

/// User-supplied publishing callback
pub type PublishCallback = Arc<dyn Fn(PublishPayload) -> anyhow::Result<()> + Send + Sync>;

/// Checkpoint file contents read when a publish is dispatched.
///
/// Later saves rotate the files on disk, so a background worker ships
/// these bytes rather than reopening the paths.
#[derive(Debug, Clone)]
pub struct CheckpointSnapshot {
    pub paths: CheckpointPaths,
    pub state: Vec<u8>,
    pub params: Vec<u8>,
}

impl CheckpointSnapshot {
    pub fn read(paths: CheckpointPaths) -> std::io::Result<Self> {
        let state = std::fs::read(&paths.state)?;
        let params = std::fs::read(&paths.params)?;
        Ok(Self {
            paths,
            state,
            params,
        })
    }
}

/// Data handed to the callback, moved into the worker at spawn time
#[derive(Debug, Clone)]
pub struct PublishPayload {
    /// Episode at which the publish was triggered
    pub episode: usize,
    /// Whether checkpoint files should be shipped too
    pub upload_checkpoint: bool,
    /// Latest checkpoint generation, present only when uploading checkpoints
    pub checkpoint: Option<CheckpointSnapshot>,
}

/// Handle of a background publish job
#[derive(Debug)]
pub struct PublishHandle {
    episode: usize,
    handle: JoinHandle<()>,
}

impl PublishHandle {
    pub fn episode(&self) -> usize {
        self.episode
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job to finish. Panics inside the job are logged.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!("Publish job from episode {} failed: {}", self.episode, e);
        }
    }
}

fn run_callback(callback: &PublishCallback, payload: PublishPayload) {
    let episode = payload.episode;
    match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
        Ok(Ok(())) => debug!("Published results for episode {}", episode),
        Ok(Err(e)) => warn!("Publishing results for episode {} failed: {:#}", episode, e),
        Err(_) => warn!("Publishing results for episode {} panicked", episode),
    }
}

/// Publish once.
///
/// Sequential mode runs the callback inline and returns `None`. Parallel
/// mode first waits for `previous` to finish, then starts a background
/// worker and returns its handle, so at most one job is ever in flight.
pub async fn dispatch(
    callback: &PublishCallback,
    payload: PublishPayload,
    mode: PublishMode,
    previous: Option<PublishHandle>,
) -> Option<PublishHandle> {
    if let Some(previous) = previous {
        if !previous.is_finished() {
            debug!(
                "Waiting for publish job from episode {} before dispatching",
                previous.episode()
            );
        }
        previous.join().await;
    }

    match mode {
        PublishMode::Sequential => {
            run_callback(callback, payload);
            None
        }
        PublishMode::Parallel => {
            let episode = payload.episode;
            let callback = callback.clone();
            let handle = tokio::task::spawn_blocking(move || run_callback(&callback, payload));
            Some(PublishHandle { episode, handle })
        }
    }
}

/// Owns the callback and the single in-flight job
pub struct AsyncPublisher {
    callback: Option<PublishCallback>,
    mode: PublishMode,
    upload_checkpoint: bool,
    inflight: Option<PublishHandle>,
    dispatched: usize,
}

impl AsyncPublisher {
    pub fn new(callback: PublishCallback, mode: PublishMode, upload_checkpoint: bool) -> Self {
        Self {
            callback: Some(callback),
            mode,
            upload_checkpoint,
            inflight: None,
            dispatched: 0,
        }
    }

    /// A publisher that does nothing
    pub fn disabled() -> Self {
        Self {
            callback: None,
            mode: PublishMode::Sequential,
            upload_checkpoint: false,
            inflight: None,
            dispatched: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.callback.is_some()
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Number of dispatches so far
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn has_inflight(&self) -> bool {
        self.inflight.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Publish results for `episode`
    pub async fn dispatch(&mut self, episode: usize, checkpoint: Option<CheckpointPaths>) {
        let Some(callback) = self.callback.as_ref() else {
            return;
        };

        info!("Publishing results (episode {}, {})", episode, self.mode);
        let checkpoint = match checkpoint {
            Some(paths) if self.upload_checkpoint => match CheckpointSnapshot::read(paths) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Could not read checkpoint for publishing: {}", e);
                    None
                }
            },
            _ => None,
        };
        let payload = PublishPayload {
            episode,
            upload_checkpoint: self.upload_checkpoint,
            checkpoint,
        };
        let previous = self.inflight.take();
        self.inflight = dispatch(callback, payload, self.mode, previous).await;
        self.dispatched += 1;
    }

    /// Wait for the in-flight job, if any
    pub async fn finish(&mut self) {
        if let Some(handle) = self.inflight.take() {
            debug!("Waiting for final publish job (episode {})", handle.episode());
            handle.join().await;
        }
    }
}

/// Callback copying the results into `destination`.
///
/// Checkpoint files are copied only when the payload asks for them.
pub fn copy_publisher(destination: PathBuf) -> PublishCallback {
    Arc::new(move |payload: PublishPayload| -> anyhow::Result<()> {
        std::fs::create_dir_all(&destination)?;

        let marker = destination.join("published.json");
        let body = serde_json::json!({
            "episode": payload.episode,
            "published_at": chrono::Utc::now().to_rfc3339(),
        });
        std::fs::write(&marker, serde_json::to_vec_pretty(&body)?)?;

        if payload.upload_checkpoint {
            if let Some(snapshot) = &payload.checkpoint {
                write_into(&snapshot.paths.state, &snapshot.state, &destination)?;
                write_into(&snapshot.paths.params, &snapshot.params, &destination)?;
            }
        }
        Ok(())
    })
}

fn write_into(file: &Path, data: &[u8], destination: &Path) -> anyhow::Result<()> {
    let Some(name) = file.file_name() else {
        anyhow::bail!("not a file path: {:?}", file);
    };
    std::fs::write(destination.join(name), data)?;
    Ok(())
}

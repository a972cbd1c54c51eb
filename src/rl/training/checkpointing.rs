//! Checkpointing
//!
//! Persists the training state and the agent's parameters with one
//! previous generation kept as a backup.
//!
//! Layout for experiment `<dir>/<name>`:
//! - `<name>.json` / `<name>.json.bak`: training state
//! - `<name>.params` / `<name>.params.bak`: agent parameters (opaque bytes)
//!
//! The state file records the SHA-256 of its parameter file, so a state is
//! never paired with parameters from another generation.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::CheckpointError;
use crate::rl::core::TrainingState;

/// Suffix of the previous-generation slot
pub const BACKUP_SUFFIX: &str = "bak";

/// Current state-file format version
pub const CHECKPOINT_VERSION: u32 = 2;

/// On-disk envelope of the training state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    saved_at: DateTime<Utc>,
    /// Hex SHA-256 of the parameter file written with this state
    params_sha256: String,
    state: TrainingState,
}

/// File pair forming one checkpoint generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub state: PathBuf,
    pub params: PathBuf,
}

impl CheckpointPaths {
    fn exists(&self) -> bool {
        self.state.exists() && self.params.exists()
    }
}

/// Saves and restores checkpoints for one experiment
#[derive(Debug, Clone)]
pub struct CheckpointCoordinator {
    /// Directory holding the checkpoint files
    dir: PathBuf,
    /// Experiment name, the stem of every file
    name: String,
}

impl CheckpointCoordinator {
    /// Create a coordinator for experiment `name` inside `dir`
    pub fn new<P: AsRef<Path>>(dir: P, name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.into(),
        }
    }

    /// Create from an experiment path such as `out_dir/breakout`
    pub fn from_experiment_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "experiment".to_string());
        Self::new(dir, name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn experiment_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Paths of the current generation
    pub fn current(&self) -> CheckpointPaths {
        CheckpointPaths {
            state: self.dir.join(format!("{}.json", self.name)),
            params: self.dir.join(format!("{}.params", self.name)),
        }
    }

    /// Paths of the previous generation
    pub fn previous(&self) -> CheckpointPaths {
        let current = self.current();
        CheckpointPaths {
            state: backup_path(&current.state),
            params: backup_path(&current.params),
        }
    }

    /// Whether any generation exists on disk, including one left by an
    /// interrupted rotation
    pub fn exists(&self) -> bool {
        let (current, previous) = (self.current(), self.previous());
        current.exists() || previous.exists() || (previous.state.exists() && current.params.exists())
    }

    /// Write a new checkpoint, demoting the current generation to the backup slot
    pub fn save(&self, state: &TrainingState, params: &[u8]) -> Result<CheckpointPaths, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;

        let current = self.current();
        let previous = self.previous();
        if current.exists() {
            rename(&current.state, &previous.state)?;
            rename(&current.params, &previous.params)?;
            debug!("Rotated checkpoint {} to previous generation", self.name);
        } else if current.params.exists() && previous.state.exists() {
            rename(&current.params, &previous.params)?;
            warn!("Completed interrupted rotation of checkpoint {}", self.name);
        }

        let envelope = StateFile {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            params_sha256: params_digest(params),
            state: state.clone(),
        };
        let body = serde_json::to_vec_pretty(&envelope).map_err(|e| CheckpointError::Corrupt {
            path: current.state.clone(),
            source: e,
        })?;

        write_atomic(&current.state, &body)?;
        write_atomic(&current.params, params)?;

        info!(
            "Saved checkpoint to {:?} (start_episode={}, {} parameter bytes)",
            current.state,
            state.start_episode,
            params.len()
        );
        Ok(current)
    }

    /// Restore the latest readable generation
    pub fn load(&self) -> Result<(TrainingState, Vec<u8>), CheckpointError> {
        self.load_with(|_, _| Ok(()))
    }

    /// Restore the latest generation that `accept` takes.
    ///
    /// A generation rejected by `accept` falls through to the next
    /// candidate exactly like an unreadable one.
    pub fn load_with<F>(&self, mut accept: F) -> Result<(TrainingState, Vec<u8>), CheckpointError>
    where
        F: FnMut(&TrainingState, &[u8]) -> anyhow::Result<()>,
    {
        let current = self.current();
        let current_err = match try_generation(&current, &mut accept) {
            Ok(restored) => {
                info!("Restored checkpoint {:?}", current.state);
                return Ok(restored);
            }
            Err(e) => e,
        };
        warn!(
            "Current checkpoint unreadable ({}), trying previous generation",
            current_err
        );

        let previous = self.previous();
        let mut previous_err = match try_generation(&previous, &mut accept) {
            Ok(restored) => {
                info!("Restored previous checkpoint {:?}", previous.state);
                return Ok(restored);
            }
            Err(e) => e.to_string(),
        };

        // a save interrupted between its two renames leaves the newest
        // state in the backup slot next to the still-current parameters
        if !current.state.exists() {
            let rotated = CheckpointPaths {
                state: previous.state.clone(),
                params: current.params.clone(),
            };
            match try_generation(&rotated, &mut accept) {
                Ok(restored) => {
                    warn!(
                        "Restored checkpoint {:?} left by an interrupted rotation",
                        rotated.state
                    );
                    return Ok(restored);
                }
                Err(e) => previous_err = format!("{}; interrupted rotation: {}", previous_err, e),
            }
        }

        let listing = self.list_dir();
        error!(
            "Failed to restore checkpoint {}: directory {:?} contains {:?}",
            self.name, self.dir, listing
        );
        Err(CheckpointError::Restore {
            dir: self.dir.clone(),
            current: current_err.to_string(),
            previous: previous_err,
            listing,
        })
    }

    /// Sorted file names in the checkpoint directory
    pub fn list_dir(&self) -> Vec<String> {
        let mut names = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        names
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

fn rename(from: &Path, to: &Path) -> Result<(), CheckpointError> {
    fs::rename(from, to).map_err(|e| CheckpointError::io(from, e))
}

/// Write to a temporary sibling, sync, then rename over the target
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let tmp_path = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));

    let mut file = File::create(&tmp_path).map_err(|e| CheckpointError::io(&tmp_path, e))?;
    file.write_all(data)
        .map_err(|e| CheckpointError::io(&tmp_path, e))?;
    file.sync_all()
        .map_err(|e| CheckpointError::io(&tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| CheckpointError::io(path, e))
}

fn params_digest(params: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params);
    format!("{:x}", hasher.finalize())
}

fn try_generation<F>(
    paths: &CheckpointPaths,
    accept: &mut F,
) -> Result<(TrainingState, Vec<u8>), CheckpointError>
where
    F: FnMut(&TrainingState, &[u8]) -> anyhow::Result<()>,
{
    let (state, params) = load_generation(paths)?;
    accept(&state, &params).map_err(|source| CheckpointError::Rejected {
        path: paths.params.clone(),
        source,
    })?;
    Ok((state, params))
}

fn load_generation(paths: &CheckpointPaths) -> Result<(TrainingState, Vec<u8>), CheckpointError> {
    if !paths.state.exists() {
        return Err(CheckpointError::NotFound(paths.state.clone()));
    }
    let body = fs::read(&paths.state).map_err(|e| CheckpointError::io(&paths.state, e))?;
    let envelope: StateFile =
        serde_json::from_slice(&body).map_err(|e| CheckpointError::Corrupt {
            path: paths.state.clone(),
            source: e,
        })?;
    if envelope.version != CHECKPOINT_VERSION {
        return Err(CheckpointError::Version {
            found: envelope.version,
            expected: CHECKPOINT_VERSION,
        });
    }

    if !paths.params.exists() {
        return Err(CheckpointError::NotFound(paths.params.clone()));
    }
    let params = fs::read(&paths.params).map_err(|e| CheckpointError::io(&paths.params, e))?;

    let found = params_digest(&params);
    if found != envelope.params_sha256 {
        return Err(CheckpointError::Mismatch {
            path: paths.params.clone(),
            expected: envelope.params_sha256,
            found,
        });
    }

    Ok((envelope.state, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rl_ckpt_test_{}", uuid::Uuid::new_v4()))
    }

    fn state_at(start_episode: usize) -> TrainingState {
        TrainingState {
            start_episode,
            num_updates: start_episode as u64 * 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_paths() {
        let coordinator = CheckpointCoordinator::from_experiment_path("out_dir/breakout");
        assert_eq!(coordinator.current().state, PathBuf::from("out_dir/breakout.json"));
        assert_eq!(
            coordinator.previous().params,
            PathBuf::from("out_dir/breakout.params.bak")
        );
        assert_eq!(coordinator.experiment_path(), PathBuf::from("out_dir/breakout"));
    }

    #[test]
    fn test_round_trip_creates_directory() {
        let dir = scratch_dir().join("nested");
        let coordinator = CheckpointCoordinator::new(&dir, "run");
        let params: Vec<u8> = (0..=255u8).collect();

        assert!(!coordinator.exists());
        coordinator.save(&state_at(19), &params).unwrap();
        assert!(coordinator.exists());

        let (state, loaded) = coordinator.load().unwrap();
        assert_eq!(state, state_at(19));
        assert_eq!(loaded, params);

        let _ = fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn test_second_save_keeps_first_as_backup() {
        let dir = scratch_dir();
        let coordinator = CheckpointCoordinator::new(&dir, "run");

        coordinator.save(&state_at(19), b"first").unwrap();
        coordinator.save(&state_at(39), b"second").unwrap();

        assert_eq!(fs::read(coordinator.previous().params).unwrap(), b"first");
        assert_eq!(fs::read(coordinator.current().params).unwrap(), b"second");
        let (previous, _) = load_generation(&coordinator.previous()).unwrap();
        assert_eq!(previous.start_episode, 19);

        // a third save drops the first generation entirely
        coordinator.save(&state_at(59), b"third").unwrap();
        assert_eq!(fs::read(coordinator.previous().params).unwrap(), b"second");
        assert!(!coordinator.list_dir().iter().any(|n| n.contains(".tmp.")));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_falls_back_to_previous_generation() {
        let dir = scratch_dir();
        let coordinator = CheckpointCoordinator::new(&dir, "run");

        coordinator.save(&state_at(19), b"first").unwrap();
        coordinator.save(&state_at(39), b"second").unwrap();
        fs::write(coordinator.current().state, b"{ truncated").unwrap();

        let (state, params) = coordinator.load().unwrap();
        assert_eq!(state.start_episode, 19);
        assert_eq!(params, b"first");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_current_params_fall_back_to_previous_generation() {
        let dir = scratch_dir();
        let coordinator = CheckpointCoordinator::new(&dir, "run");

        coordinator.save(&state_at(19), b"first").unwrap();
        coordinator.save(&state_at(39), b"second").unwrap();
        fs::write(coordinator.current().params, b"{ truncated").unwrap();

        assert!(matches!(
            load_generation(&coordinator.current()),
            Err(CheckpointError::Mismatch { .. })
        ));
        let (state, params) = coordinator.load().unwrap();
        assert_eq!(state.start_episode, 19);
        assert_eq!(params, b"first");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_rejected_generation_falls_back() {
        let dir = scratch_dir();
        let coordinator = CheckpointCoordinator::new(&dir, "run");

        coordinator.save(&state_at(19), b"first").unwrap();
        coordinator.save(&state_at(39), b"second").unwrap();

        let mut offered = Vec::new();
        let (state, params) = coordinator
            .load_with(|state, params| {
                offered.push(state.start_episode);
                if params == b"second" {
                    anyhow::bail!("cannot decode parameters");
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(offered, vec![39, 19]);
        assert_eq!(state.start_episode, 19);
        assert_eq!(params, b"first");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_interrupted_rotation_never_mixes_generations() {
        let dir = scratch_dir();
        let coordinator = CheckpointCoordinator::new(&dir, "run");

        coordinator.save(&state_at(19), b"first").unwrap();
        coordinator.save(&state_at(39), b"second").unwrap();
        // third save stopped after moving the state but before moving the params
        fs::rename(coordinator.current().state, coordinator.previous().state).unwrap();

        assert!(matches!(
            load_generation(&coordinator.previous()),
            Err(CheckpointError::Mismatch { .. })
        ));
        let (state, params) = coordinator.load().unwrap();
        assert_eq!(state.start_episode, 39);
        assert_eq!(params, b"second");

        // first rotation interrupted: no complete backup pair, still restorable
        let first = CheckpointCoordinator::new(dir.join("first"), "run");
        first.save(&state_at(19), b"only").unwrap();
        fs::rename(first.current().state, first.previous().state).unwrap();
        assert!(first.exists());
        assert_eq!(first.load().unwrap().0.start_episode, 19);

        // the next save finishes the rotation before writing
        coordinator.save(&state_at(59), b"third").unwrap();
        let (state, params) = coordinator.load().unwrap();
        assert_eq!(state.start_episode, 59);
        assert_eq!(params, b"third");
        let (previous, params) = load_generation(&coordinator.previous()).unwrap();
        assert_eq!(previous.start_episode, 39);
        assert_eq!(params, b"second");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_reports_listing_when_both_generations_fail() {
        let dir = scratch_dir();
        let coordinator = CheckpointCoordinator::new(&dir, "run");

        coordinator.save(&state_at(19), b"only").unwrap();
        fs::write(coordinator.current().state, b"garbage").unwrap();

        match coordinator.load() {
            Err(CheckpointError::Restore { listing, .. }) => {
                assert_eq!(listing, vec!["run.json".to_string(), "run.params".to_string()]);
            }
            other => panic!("expected restore failure, got {:?}", other),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_checkpoint_fails() {
        let coordinator = CheckpointCoordinator::new(scratch_dir(), "absent");
        assert!(matches!(
            coordinator.load(),
            Err(CheckpointError::Restore { .. })
        ));
    }
}

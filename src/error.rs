use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the experiment runner
#[derive(Error, Debug)]
pub enum ExperimentError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Episode errors
    #[error("Rollout failed at episode {episode}: {source}")]
    Rollout {
        episode: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Agent error: {0}")]
    Agent(#[source] anyhow::Error),

    // Persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ExperimentError
pub type Result<T> = std::result::Result<T, ExperimentError>;

/// Errors raised while writing or restoring checkpoints
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint state at {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Checkpoint parameters {path} do not match their state file (expected sha256 {expected}, found {found})")]
    Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Checkpoint at {path} rejected: {source}")]
    Rejected {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error(
        "Failed to restore checkpoint from {dir}: current generation ({current}), \
         previous generation ({previous}); directory contains [{}]",
        .listing.join(", ")
    )]
    Restore {
        dir: PathBuf,
        current: String,
        previous: String,
        listing: Vec<String>,
    },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_error_lists_directory() {
        let err = CheckpointError::Restore {
            dir: PathBuf::from("/tmp/exp"),
            current: "missing".to_string(),
            previous: "missing".to_string(),
            listing: vec!["run.json.bak".to_string(), "run.params".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("/tmp/exp"));
        assert!(msg.contains("run.json.bak, run.params"));
    }

    #[test]
    fn test_rollout_error_carries_episode() {
        let err = ExperimentError::Rollout {
            episode: 42,
            source: anyhow::anyhow!("env exploded"),
        };
        assert_eq!(
            err.to_string(),
            "Rollout failed at episode 42: env exploded"
        );
    }
}

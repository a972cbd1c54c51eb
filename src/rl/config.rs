//! RL Configuration
//!
//! Immutable configuration consumed by the experiment driver.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rl::core::ScheduleParams;

/// Episode loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Episode index at which the run stops (exclusive)
    pub total_episodes: usize,
    /// Every `test_every`-th episode is an evaluation episode
    pub test_every: usize,
    /// The last `eval_tail` episodes are all evaluation episodes
    pub eval_tail: usize,
    /// Render evaluation episodes
    pub render: bool,
    /// Call the agent's plot hook on evaluation episodes
    pub plot: bool,
    /// Checkpoint frequency, counted from the resume point (episodes)
    pub checkpoint_every: usize,
    /// Publish frequency (episodes)
    pub publish_every: usize,
    /// Diagnostics logging frequency (episodes)
    pub diagnostics_every: usize,
    /// Pause between steps, used for human-speed rendering
    pub step_delay_ms: u64,
    /// Environment seed (0 = leave unseeded)
    pub seed: u64,
    /// Keep at most this many entries per history sequence
    pub history_limit: Option<usize>,
    /// Start fresh instead of failing when both checkpoint generations are unreadable
    pub fresh_on_restore_failure: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            total_episodes: 1_000_000,
            test_every: 25,
            eval_tail: 100,
            render: false,
            plot: false,
            checkpoint_every: 20,
            publish_every: 50,
            diagnostics_every: 10,
            step_delay_ms: 0,
            seed: 0,
            history_limit: None,
            fresh_on_restore_failure: false,
        }
    }
}

impl DriverConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.test_every == 0 {
            errors.push("test_every must be positive".to_string());
        }
        if self.checkpoint_every == 0 {
            errors.push("checkpoint_every must be positive".to_string());
        }
        if self.publish_every == 0 {
            errors.push("publish_every must be positive".to_string());
        }
        if self.diagnostics_every == 0 {
            errors.push("diagnostics_every must be positive".to_string());
        }
        if self.history_limit == Some(0) {
            errors.push("history_limit must be positive when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Read-only agent settings the driver needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Whether observations are image frames fed to a convolutional model
    pub conv: bool,
    /// Discount factor (gamma)
    pub discount: f64,
    /// Eligibility-trace lambda
    pub lambda: f64,
    /// Reward-scale factor applied by the environment wrapper
    pub scale_reward: f64,
    /// Schedule inputs for a fresh run
    pub schedule: ScheduleParams,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            conv: false,
            discount: 0.99,
            lambda: 0.0,
            scale_reward: 1.0,
            schedule: ScheduleParams::default(),
        }
    }
}

/// How results are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// Run the callback inline on the training task
    Sequential,
    /// Run the callback on a background worker, at most one at a time
    #[default]
    Parallel,
}

impl std::fmt::Display for PublishMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishMode::Sequential => write!(f, "sequential"),
            PublishMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Result publishing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub mode: PublishMode,
    /// Also ship checkpoint files
    #[serde(default)]
    pub upload_checkpoint: bool,
    /// Destination directory for the bundled copy publisher
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.test_every, 25);
        assert_eq!(config.checkpoint_every, 20);
        assert_eq!(config.publish_every, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_driver_validate_rejects_zero_periods() {
        let config = DriverConfig {
            test_every: 0,
            checkpoint_every: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_publish_mode_serde() {
        let mode: PublishMode = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(mode, PublishMode::Sequential);
        assert_eq!(PublishMode::Parallel.to_string(), "parallel");
    }
}

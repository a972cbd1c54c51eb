//! Training State
//!
//! Mutable bookkeeping shared between the experiment driver and the agent.
//! The driver owns the resume cursor; the agent owns the update counter.

use serde::{Deserialize, Serialize};

/// Inputs to the agent's exploration and learning-rate schedules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParams {
    /// Exploration rate at episode 0
    pub epsilon_start: f64,
    /// Floor for the exploration rate
    pub epsilon_min: f64,
    /// Episodes over which epsilon decays from start to min
    pub epsilon_decay_episodes: usize,
    /// Base learning rate
    pub learning_rate: f64,
    /// Multiplicative learning-rate decay applied per 50k updates
    pub learning_rate_decay: f64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay_episodes: 500,
            learning_rate: 0.1,
            learning_rate_decay: 1.0,
        }
    }
}

/// Resumable training state persisted with every checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Episode the loop resumes from. Only advanced right before a checkpoint save.
    pub start_episode: usize,
    /// Cumulative number of learning updates applied by the agent
    pub num_updates: u64,
    /// Factor the environment wrapper multiplies rewards by
    pub scale_reward: f64,
    /// Schedule inputs
    #[serde(default)]
    pub schedule: ScheduleParams,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self {
            start_episode: 0,
            num_updates: 0,
            scale_reward: 1.0,
            schedule: ScheduleParams::default(),
        }
    }
}

impl TrainingState {
    /// Create a fresh state with the given schedule
    pub fn new(scale_reward: f64, schedule: ScheduleParams) -> Self {
        Self {
            scale_reward,
            schedule,
            ..Default::default()
        }
    }

    /// Number of 50k-update epochs completed
    pub fn epoch(&self) -> f64 {
        self.num_updates as f64 / 50_000.0
    }

    /// Divide a reward by the reward-scale factor, guarding against a zero factor
    pub fn unscale(&self, value: f64) -> f64 {
        if self.scale_reward == 0.0 {
            value
        } else {
            value / self.scale_reward
        }
    }
}

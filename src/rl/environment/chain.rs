//! Chain Environment
//!
//! Corridor of `size` states. Moving forward pays nothing until the far
//! end, where staying put pays the large reward. Moving back returns to
//! the start with a small reward. With probability `slip` the chosen
//! action is swapped for the other one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rl::core::{EnvSpec, Environment, StepOutcome};

/// Move one state towards the far end
pub const FORWARD: usize = 0;
/// Return to the first state
pub const BACK: usize = 1;
/// Size of the action space
pub const NUM_ACTIONS: usize = 2;

/// Chain environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of states
    pub size: usize,
    /// Probability that the action is swapped
    pub slip: f64,
    /// Reward for moving back
    pub small_reward: f64,
    /// Reward for staying at the far end
    pub large_reward: f64,
    /// Steps per episode
    pub step_limit: usize,
    /// Reward at which the task counts as solved
    #[serde(default)]
    pub reward_threshold: Option<f64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            size: 5,
            slip: 0.2,
            small_reward: 2.0,
            large_reward: 10.0,
            step_limit: 100,
            reward_threshold: Some(300.0),
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.size < 2 {
            errors.push("environment.size must be at least 2".to_string());
        }
        if !(0.0..=1.0).contains(&self.slip) {
            errors.push("environment.slip must be within [0, 1]".to_string());
        }
        if self.step_limit == 0 {
            errors.push("environment.step_limit must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// The chain task
pub struct ChainEnvironment {
    config: ChainConfig,
    position: usize,
    steps: usize,
    closed: bool,
    rng: StdRng,
}

impl ChainEnvironment {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            position: 0,
            steps: 0,
            closed: false,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn num_states(&self) -> usize {
        self.config.size
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Environment for ChainEnvironment {
    type Observation = usize;
    type Action = usize;

    fn spec(&self) -> EnvSpec {
        let low = 0.0_f64.min(self.config.small_reward);
        let high = self.config.large_reward.max(self.config.small_reward);
        EnvSpec {
            name: format!("chain-{}", self.config.size),
            max_episode_steps: Some(self.config.step_limit),
            reward_threshold: self.config.reward_threshold,
            reward_range: (low, high),
        }
    }

    fn reset(&mut self) -> anyhow::Result<usize> {
        if self.closed {
            anyhow::bail!("chain environment is closed");
        }
        self.position = 0;
        self.steps = 0;
        Ok(self.position)
    }

    fn step(&mut self, action: &usize) -> anyhow::Result<StepOutcome<usize>> {
        if self.closed {
            anyhow::bail!("chain environment is closed");
        }
        if *action >= NUM_ACTIONS {
            anyhow::bail!("invalid chain action {}", action);
        }

        let mut action = *action;
        if self.config.slip > 0.0 && self.rng.gen_bool(self.config.slip.min(1.0)) {
            action = NUM_ACTIONS - 1 - action;
        }

        let last = self.config.size - 1;
        let reward = match action {
            FORWARD if self.position == last => self.config.large_reward,
            FORWARD => {
                self.position += 1;
                0.0
            }
            _ => {
                self.position = 0;
                self.config.small_reward
            }
        };

        self.steps += 1;
        Ok(StepOutcome::new(
            self.position,
            reward,
            self.steps >= self.config.step_limit,
        ))
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn render(&mut self) -> anyhow::Result<()> {
        let corridor: String = (0..self.config.size)
            .map(|i| if i == self.position { 'A' } else { '.' })
            .collect();
        debug!("[{}] step {}", corridor, self.steps);
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.closed = true;
        Ok(())
    }
}

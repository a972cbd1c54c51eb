//! Environment Contract
//!
//! Gym-like reset/step interface the rollout engine drives.

use serde::Serialize;

/// Static metadata describing an environment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvSpec {
    /// Environment identifier
    pub name: String,
    /// Step budget per episode (None = unbounded)
    pub max_episode_steps: Option<usize>,
    /// Mean reward at which the task counts as solved
    pub reward_threshold: Option<f64>,
    /// Lowest and highest reward a single step can yield
    pub reward_range: (f64, f64),
}

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct StepOutcome<O> {
    /// Observation after the step
    pub observation: O,
    /// Reward received
    pub reward: f64,
    /// Whether the episode terminated
    pub done: bool,
}

impl<O> StepOutcome<O> {
    pub fn new(observation: O, reward: f64, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
        }
    }
}

/// A simulated environment
pub trait Environment {
    type Observation: Clone;
    type Action;

    /// Static metadata
    fn spec(&self) -> EnvSpec;

    /// Start a new episode and return the initial observation
    fn reset(&mut self) -> anyhow::Result<Self::Observation>;

    /// Apply an action
    fn step(&mut self, action: &Self::Action) -> anyhow::Result<StepOutcome<Self::Observation>>;

    /// Seed the environment's random source
    fn seed(&mut self, seed: u64);

    /// Draw the current frame
    fn render(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the environment's resources
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

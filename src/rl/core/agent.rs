//! Agent Contract
//!
//! The learning algorithm behind an agent is opaque to the driver. The
//! driver only selects actions, forwards transitions, reads diagnostics
//! and moves parameter blobs in and out of checkpoints.

use std::fmt;

use super::state::TrainingState;
use crate::rl::training::metrics::RollingHistory;

/// Exploration control passed to action selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// No exploration (evaluation episodes)
    Greedy,
    /// Exploration derived from the episode index (training episodes)
    Explore { episode: usize },
}

impl Control {
    /// Raw value: the episode index, or -1 for greedy
    pub fn as_raw(&self) -> i64 {
        match self {
            Control::Greedy => -1,
            Control::Explore { episode } => *episode as i64,
        }
    }

    pub fn is_greedy(&self) -> bool {
        matches!(self, Control::Greedy)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// A single environment transition forwarded to the learner
#[derive(Debug, Clone)]
pub struct Transition<O, A> {
    pub observation: O,
    pub action: A,
    pub reward: f64,
    pub next_observation: O,
    pub done: bool,
}

/// Decision-making agent
pub trait Agent {
    type Observation;
    type Action: Clone;

    /// Select an action
    fn act(
        &mut self,
        observation: &Self::Observation,
        control: Control,
        state: &TrainingState,
    ) -> anyhow::Result<Self::Action>;

    /// Apply a learning update. Implementations bump `state.num_updates`.
    fn learn(
        &mut self,
        transition: Transition<Self::Observation, Self::Action>,
        state: &mut TrainingState,
    ) -> anyhow::Result<()>;

    /// Exploration rate for a control value (0 when greedy)
    fn epsilon(&self, control: Control, state: &TrainingState) -> f64;

    /// Current learning rate
    fn learning_rate(&self, state: &TrainingState) -> f64;

    /// The agent's own estimate of the discounted return from an observation
    fn value_estimate(&self, observation: &Self::Observation) -> anyhow::Result<f64>;

    /// Serialize learned parameters
    fn parameters(&self) -> anyhow::Result<Vec<u8>>;

    /// Restore learned parameters produced by [`Agent::parameters`]
    fn restore_parameters(&mut self, bytes: &[u8]) -> anyhow::Result<()>;

    /// Visualization hook, invoked on evaluation episodes when plotting is on
    fn plot(
        &mut self,
        _history: &RollingHistory,
        _reward_threshold: Option<f64>,
        _start_episode: usize,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_raw() {
        assert_eq!(Control::Greedy.as_raw(), -1);
        assert_eq!(Control::Explore { episode: 7 }.as_raw(), 7);
        assert!(Control::Greedy.is_greedy());
        assert_eq!(Control::Explore { episode: 3 }.to_string(), "3");
    }
}

//! Tabular Q-Learning
//!
//! Epsilon-greedy one-step Q-learning over discrete observations and
//! actions. The table is serialized as JSON for checkpoints.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::rl::core::{Agent, Control, TrainingState, Transition};

/// Updates per learning-rate decay step
const UPDATES_PER_EPOCH: u64 = 50_000;

/// Serialized form of the Q table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct QTable {
    num_states: usize,
    num_actions: usize,
    values: Vec<Vec<f64>>,
}

/// Tabular Q-learning agent
pub struct TabularQAgent {
    table: QTable,
    discount: f64,
    rng: StdRng,
}

impl TabularQAgent {
    /// Create an agent with a zero-initialized table
    pub fn new(num_states: usize, num_actions: usize, discount: f64) -> Self {
        Self {
            table: QTable {
                num_states,
                num_actions,
                values: vec![vec![0.0; num_actions]; num_states],
            },
            discount,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed action selection
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn q_values(&self, observation: usize) -> anyhow::Result<&[f64]> {
        self.table
            .values
            .get(observation)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "observation {} outside table of {} states",
                    observation,
                    self.table.num_states
                )
            })
    }

    /// Index of the best action; ties go to the lowest index
    fn greedy_action(&self, observation: usize) -> anyhow::Result<usize> {
        let values = self.q_values(observation)?;
        let mut best = 0;
        for (action, value) in values.iter().enumerate() {
            if *value > values[best] {
                best = action;
            }
        }
        Ok(best)
    }
}

impl Agent for TabularQAgent {
    type Observation = usize;
    type Action = usize;

    fn act(
        &mut self,
        observation: &usize,
        control: Control,
        state: &TrainingState,
    ) -> anyhow::Result<usize> {
        let epsilon = self.epsilon(control, state);
        if epsilon > 0.0 && self.rng.gen::<f64>() < epsilon {
            return Ok(self.rng.gen_range(0..self.table.num_actions));
        }
        self.greedy_action(*observation)
    }

    fn learn(
        &mut self,
        transition: Transition<usize, usize>,
        state: &mut TrainingState,
    ) -> anyhow::Result<()> {
        let bootstrap = if transition.done {
            0.0
        } else {
            self.q_values(transition.next_observation)?
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max)
        };
        let target = transition.reward + self.discount * bootstrap;
        let lr = self.learning_rate(state);

        let current = self
            .table
            .values
            .get_mut(transition.observation)
            .and_then(|row| row.get_mut(transition.action))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "transition ({}, {}) outside table",
                    transition.observation,
                    transition.action
                )
            })?;
        *current += lr * (target - *current);

        state.num_updates += 1;
        Ok(())
    }

    /// Linear decay from `epsilon_start` to `epsilon_min` over the
    /// configured number of episodes; zero when greedy
    fn epsilon(&self, control: Control, state: &TrainingState) -> f64 {
        let Control::Explore { episode } = control else {
            return 0.0;
        };
        let schedule = &state.schedule;
        if schedule.epsilon_decay_episodes == 0 {
            return schedule.epsilon_min;
        }
        let progress = (episode as f64 / schedule.epsilon_decay_episodes as f64).min(1.0);
        schedule.epsilon_start - (schedule.epsilon_start - schedule.epsilon_min) * progress
    }

    fn learning_rate(&self, state: &TrainingState) -> f64 {
        let schedule = &state.schedule;
        let epochs = (state.num_updates / UPDATES_PER_EPOCH) as i32;
        schedule.learning_rate * schedule.learning_rate_decay.powi(epochs)
    }

    fn value_estimate(&self, observation: &usize) -> anyhow::Result<f64> {
        Ok(self
            .q_values(*observation)?
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    fn parameters(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.table)?)
    }

    fn restore_parameters(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let table: QTable = serde_json::from_slice(bytes)?;
        if table.num_states != self.table.num_states || table.num_actions != self.table.num_actions
        {
            anyhow::bail!(
                "Q table shape {}x{} does not match agent shape {}x{}",
                table.num_states,
                table.num_actions,
                self.table.num_states,
                self.table.num_actions
            );
        }
        if table.values.len() != table.num_states
            || table.values.iter().any(|row| row.len() != table.num_actions)
        {
            anyhow::bail!("Q table rows do not match the declared shape");
        }
        self.table = table;
        Ok(())
    }
}

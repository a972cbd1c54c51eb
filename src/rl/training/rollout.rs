//! Episode Rollout
//!
//! Runs exactly one episode of agent-environment interaction.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::rl::core::{Agent, Control, Environment, Transition, TrainingState};

/// Parameters of a single rollout
#[derive(Debug, Clone)]
pub struct RolloutRequest {
    /// Exploration control handed to the agent
    pub control: Control,
    /// Step budget; reaching it is a normal episode end
    pub max_steps: usize,
    /// Render every step
    pub render: bool,
    /// Discount factor for the discounted return
    pub discount: f64,
    /// Pause between steps
    pub step_delay: Duration,
    /// Forward transitions to the agent's learning update
    pub learn: bool,
}

impl RolloutRequest {
    pub fn new(control: Control, max_steps: usize, discount: f64) -> Self {
        Self {
            control,
            max_steps,
            render: false,
            discount,
            step_delay: Duration::ZERO,
            learn: !control.is_greedy(),
        }
    }

    pub fn with_render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_learning(mut self, learn: bool) -> Self {
        self.learn = learn;
        self
    }
}

/// Result of one episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    /// Sum of raw rewards
    pub total_reward: f64,
    /// Sum of `discount^t * reward_t`
    pub discounted_return: f64,
    /// Steps taken
    pub steps: usize,
    /// Wall-clock duration of the episode
    pub duration: Duration,
    /// Agent's value estimate at the initial observation
    pub value_estimate: f64,
}

impl EpisodeOutcome {
    /// Milliseconds per 100 steps
    pub fn time_per_100_steps(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        self.duration.as_secs_f64() * 1000.0 / self.steps as f64 * 100.0
    }
}

/// Executes single episodes
pub struct RolloutEngine;

impl RolloutEngine {
    /// Run one episode.
    ///
    /// Any agent or environment error aborts the episode and is returned as is.
    pub async fn execute<A, E>(
        agent: &mut A,
        env: &mut E,
        state: &mut TrainingState,
        request: &RolloutRequest,
    ) -> anyhow::Result<EpisodeOutcome>
    where
        E: Environment,
        A: Agent<Observation = E::Observation, Action = E::Action>,
    {
        let started = Instant::now();
        let mut observation = env.reset()?;
        let value_estimate = agent.value_estimate(&observation)?;

        let mut total_reward = 0.0;
        let mut discounted_return = 0.0;
        let mut weight = 1.0;
        let mut steps = 0;

        while steps < request.max_steps {
            let action = agent.act(&observation, request.control, state)?;
            let outcome = env.step(&action)?;
            steps += 1;

            total_reward += outcome.reward;
            discounted_return += weight * outcome.reward;
            weight *= request.discount;

            let done = outcome.done;
            if request.learn {
                agent.learn(
                    Transition {
                        observation,
                        action,
                        reward: outcome.reward,
                        next_observation: outcome.observation.clone(),
                        done,
                    },
                    state,
                )?;
            }
            observation = outcome.observation;

            if request.render {
                env.render()?;
            }
            if !request.step_delay.is_zero() {
                tokio::time::sleep(request.step_delay).await;
            }
            if done {
                break;
            }
        }

        trace!(
            steps,
            total_reward,
            discounted_return,
            "rollout finished ({})",
            request.control
        );

        Ok(EpisodeOutcome {
            total_reward,
            discounted_return,
            steps,
            duration: started.elapsed(),
            value_estimate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::{EnvSpec, StepOutcome};

    /// Emits reward 1 per step and terminates after `length` steps
    struct CountingEnv {
        length: usize,
        position: usize,
        renders: usize,
    }

    impl CountingEnv {
        fn new(length: usize) -> Self {
            Self {
                length,
                position: 0,
                renders: 0,
            }
        }
    }

    impl Environment for CountingEnv {
        type Observation = usize;
        type Action = usize;

        fn spec(&self) -> EnvSpec {
            EnvSpec {
                name: "counting".to_string(),
                max_episode_steps: Some(self.length),
                reward_threshold: None,
                reward_range: (0.0, 1.0),
            }
        }

        fn reset(&mut self) -> anyhow::Result<usize> {
            self.position = 0;
            Ok(0)
        }

        fn step(&mut self, _action: &usize) -> anyhow::Result<StepOutcome<usize>> {
            if self.position >= 100 {
                anyhow::bail!("stepped past the end");
            }
            self.position += 1;
            Ok(StepOutcome::new(self.position, 1.0, self.position >= self.length))
        }

        fn seed(&mut self, _seed: u64) {}

        fn render(&mut self) -> anyhow::Result<()> {
            self.renders += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAgent {
        learned: Vec<(usize, usize, bool)>,
        controls: Vec<Control>,
    }

    impl Agent for RecordingAgent {
        type Observation = usize;
        type Action = usize;

        fn act(&mut self, _obs: &usize, control: Control, _state: &TrainingState) -> anyhow::Result<usize> {
            self.controls.push(control);
            Ok(0)
        }

        fn learn(
            &mut self,
            transition: Transition<usize, usize>,
            state: &mut TrainingState,
        ) -> anyhow::Result<()> {
            self.learned
                .push((transition.observation, transition.next_observation, transition.done));
            state.num_updates += 1;
            Ok(())
        }

        fn epsilon(&self, _control: Control, _state: &TrainingState) -> f64 {
            0.0
        }

        fn learning_rate(&self, _state: &TrainingState) -> f64 {
            0.0
        }

        fn value_estimate(&self, observation: &usize) -> anyhow::Result<f64> {
            Ok(*observation as f64 + 2.5)
        }

        fn parameters(&self) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn restore_parameters(&mut self, _bytes: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rollout_terminates_on_done() {
        let mut env = CountingEnv::new(3);
        let mut agent = RecordingAgent::default();
        let mut state = TrainingState::default();
        let request = RolloutRequest::new(Control::Explore { episode: 0 }, 10, 0.5);

        let outcome = RolloutEngine::execute(&mut agent, &mut env, &mut state, &request)
            .await
            .unwrap();

        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.total_reward, 3.0);
        // 1 + 0.5 + 0.25
        assert!((outcome.discounted_return - 1.75).abs() < 1e-12);
        assert_eq!(outcome.value_estimate, 2.5);
        assert_eq!(agent.learned, vec![(0, 1, false), (1, 2, false), (2, 3, true)]);
        assert_eq!(state.num_updates, 3);
    }

    #[tokio::test]
    async fn test_rollout_budget_exhaustion_is_normal_end() {
        let mut env = CountingEnv::new(50);
        let mut agent = RecordingAgent::default();
        let mut state = TrainingState::default();
        let request = RolloutRequest::new(Control::Explore { episode: 4 }, 5, 1.0);

        let outcome = RolloutEngine::execute(&mut agent, &mut env, &mut state, &request)
            .await
            .unwrap();

        assert_eq!(outcome.steps, 5);
        assert_eq!(outcome.discounted_return, 5.0);
    }

    #[tokio::test]
    async fn test_greedy_rollout_does_not_learn() {
        let mut env = CountingEnv::new(4);
        let mut agent = RecordingAgent::default();
        let mut state = TrainingState::default();
        let request = RolloutRequest::new(Control::Greedy, 10, 0.9).with_render(true);

        RolloutEngine::execute(&mut agent, &mut env, &mut state, &request)
            .await
            .unwrap();

        assert!(agent.learned.is_empty());
        assert_eq!(state.num_updates, 0);
        assert!(agent.controls.iter().all(|c| *c == Control::Greedy));
        assert_eq!(env.renders, 4);
    }

    #[tokio::test]
    async fn test_rollout_propagates_env_error() {
        let mut env = CountingEnv::new(1000);
        let mut agent = RecordingAgent::default();
        let mut state = TrainingState::default();
        let request = RolloutRequest::new(Control::Greedy, 1000, 0.9);

        let err = RolloutEngine::execute(&mut agent, &mut env, &mut state, &request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stepped past the end"));
    }

    #[test]
    fn test_time_per_100_steps() {
        let outcome = EpisodeOutcome {
            total_reward: 0.0,
            discounted_return: 0.0,
            steps: 50,
            duration: Duration::from_millis(10),
            value_estimate: 0.0,
        };
        assert!((outcome.time_per_100_steps() - 20.0).abs() < 1e-9);
    }
}

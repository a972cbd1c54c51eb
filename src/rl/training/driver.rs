//! Experiment Driver
//!
//! Orchestrates the episode loop: picks train/evaluate mode per episode,
//! runs rollouts, feeds metrics, and checkpoints and publishes on
//! schedule. Interruption is cooperative: the shutdown flag is checked
//! at episode boundaries and the run ends with a final checkpoint.

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::checkpointing::{CheckpointCoordinator, CheckpointPaths};
use super::metrics::{EvalPoint, MetricsTracker};
use super::publisher::AsyncPublisher;
use super::rollout::{EpisodeOutcome, RolloutEngine, RolloutRequest};
use super::schedule::{checkpoint_due, publish_due, EpisodeMode};
use crate::coordination::ShutdownFlag;
use crate::error::{ExperimentError, Result};
use crate::rl::config::{AgentSettings, DriverConfig};
use crate::rl::core::{Agent, Control, EnvSpec, Environment, TrainingState};

/// Window of the trailing mean shown in progress lines
const PROGRESS_WINDOW: usize = 100;

/// Aggregate result of a run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Identifier of this run
    pub run_id: Uuid,
    /// Mean raw reward over the last `eval_tail` episodes
    pub mean_tail_reward: Option<f64>,
    /// Training state at exit
    pub state: TrainingState,
    /// Raw reward per episode
    pub rewards: Vec<f64>,
    /// Discounted return per episode
    pub discounted: Vec<f64>,
    /// Smoothed average after each evaluation episode
    pub smoothed: Vec<f64>,
    /// Raw reward of each evaluation episode with its index
    pub eval_rewards: Vec<EvalPoint>,
    /// Reward at which the task counts as solved
    pub reward_threshold: Option<f64>,
    /// Episodes executed by this process
    pub episodes_run: usize,
    /// Environment steps executed by this process
    pub total_steps: usize,
    /// Whether the run stopped on a shutdown request
    pub interrupted: bool,
}

impl Report {
    /// Whether the tail mean reached the reward threshold
    pub fn solved(&self) -> bool {
        match (self.mean_tail_reward, self.reward_threshold) {
            (Some(mean), Some(threshold)) => mean >= threshold,
            _ => false,
        }
    }
}

/// Owns an environment and closes it exactly once
pub struct EnvironmentGuard<E: Environment> {
    env: E,
    closed: bool,
}

impl<E: Environment> EnvironmentGuard<E> {
    pub fn new(env: E) -> Self {
        Self { env, closed: false }
    }

    pub fn get_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn spec(&self) -> EnvSpec {
        self.env.spec()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the environment; later calls are no-ops
    pub fn release(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.env.close()
    }
}

impl<E: Environment> Drop for EnvironmentGuard<E> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to close environment: {}", e);
        }
    }
}

/// What the episode loop hands back to `run`
struct LoopOutcome {
    metrics: MetricsTracker,
    episodes_run: usize,
    interrupted: bool,
}

/// Runs an experiment to completion or interruption
pub struct ExperimentDriver<A, E>
where
    E: Environment,
    A: Agent<Observation = E::Observation, Action = E::Action>,
{
    agent: A,
    env: EnvironmentGuard<E>,
    settings: AgentSettings,
    config: DriverConfig,
    state: TrainingState,
    checkpoints: Option<CheckpointCoordinator>,
    last_checkpoint: Option<CheckpointPaths>,
    publisher: AsyncPublisher,
    shutdown: ShutdownFlag,
    run_id: Uuid,
}

impl<A, E> ExperimentDriver<A, E>
where
    E: Environment,
    A: Agent<Observation = E::Observation, Action = E::Action>,
{
    /// Create a driver for a fresh run
    pub fn new(agent: A, env: E, settings: AgentSettings, config: DriverConfig) -> Self {
        let state = TrainingState::new(settings.scale_reward, settings.schedule.clone());
        Self {
            agent,
            env: EnvironmentGuard::new(env),
            settings,
            config,
            state,
            checkpoints: None,
            last_checkpoint: None,
            publisher: AsyncPublisher::disabled(),
            shutdown: ShutdownFlag::new(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Persist progress through `checkpoints` and resume from it when present
    pub fn with_checkpoints(mut self, checkpoints: CheckpointCoordinator) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_publisher(mut self, publisher: AsyncPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Start from an explicit state instead of a fresh one
    pub fn with_state(mut self, state: TrainingState) -> Self {
        self.state = state;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Run the experiment.
    ///
    /// Returns a report on completion or interruption. Any other failure
    /// is returned after the environment has been closed.
    pub async fn run(mut self) -> Result<Report> {
        let span = info_span!("experiment", run_id = %self.run_id);
        async move {
            let result = self.run_loop().await;

            if let Err(e) = self.env.release() {
                warn!("Failed to close environment: {}", e);
            }
            self.publisher.finish().await;

            match result {
                Ok(outcome) => Ok(self.report(outcome)),
                Err(e) => {
                    error!("Experiment failed: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_loop(&mut self) -> Result<LoopOutcome> {
        self.config
            .validate()
            .map_err(|errors| ExperimentError::InvalidConfig(errors.join("; ")))?;

        let spec = self.env.spec();
        info!(
            "Environment {}: max_episode_steps={:?} reward_threshold={:?} reward_range={:?}",
            spec.name, spec.max_episode_steps, spec.reward_threshold, spec.reward_range
        );

        if self.config.seed > 0 {
            self.env.get_mut().seed(self.config.seed);
            debug!("seed {}", self.config.seed);
        }

        self.restore()?;

        let max_steps = spec.max_episode_steps.unwrap_or(usize::MAX);
        let start_episode = self.state.start_episode;
        let mut metrics = MetricsTracker::new(self.config.history_limit);
        let mut episodes_run = 0;

        for episode in start_episode..self.config.total_episodes {
            if publish_due(episode, self.config.publish_every) {
                self.publisher
                    .dispatch(episode, self.last_checkpoint.clone())
                    .await;
            }

            let mode = EpisodeMode::for_episode(
                episode,
                self.config.total_episodes,
                self.config.test_every,
                self.config.eval_tail,
            );
            if mode.is_evaluate() {
                self.log_diagnostics(episode, mode);
            }

            let request = RolloutRequest::new(
                mode.control(episode),
                max_steps,
                self.settings.discount,
            )
            .with_render(mode.renders(self.config.render))
            .with_step_delay(self.config.step_delay())
            .with_learning(mode.learns());

            let outcome = RolloutEngine::execute(
                &mut self.agent,
                self.env.get_mut(),
                &mut self.state,
                &request,
            )
            .await
            .map_err(|source| ExperimentError::Rollout { episode, source })?;
            episodes_run += 1;

            if let Some(over) =
                metrics.observe_return(outcome.discounted_return, outcome.value_estimate)
            {
                warn!(
                    "Q function too high: max rew disc {:.3} max Q {:.3} rel error {:.3}",
                    over.max_discounted, over.value_estimate, over.ratio
                );
            }
            metrics.record(episode, mode, &outcome, self.state.scale_reward);

            if self.config.diagnostics_every > 0 && episode % self.config.diagnostics_every == 0 {
                self.log_diagnostics(episode, mode);
            }

            let mut saved = false;
            if self.checkpoints.is_some()
                && checkpoint_due(episode, start_episode, self.config.checkpoint_every)
            {
                let interrupted_before = self.shutdown.is_requested();
                self.checkpoint(episode)?;
                saved = true;
                if !interrupted_before && self.shutdown.is_requested() {
                    warn!("Interrupted while saving checkpoint, saving again before exit");
                    self.checkpoint(episode)?;
                }
            }

            self.log_progress(episode, mode, &outcome, &metrics);

            if mode.is_evaluate() && self.config.plot {
                if let Err(e) = self.agent.plot(metrics.history(), spec.reward_threshold, start_episode)
                {
                    warn!("Plotting failed at episode {}: {}", episode, e);
                }
            }

            if self.shutdown.is_requested() {
                if !saved {
                    self.checkpoint(episode)?;
                }
                info!(
                    "Shutdown requested ({:?}), stopping after episode {}",
                    self.shutdown.signal(),
                    episode
                );
                return Ok(LoopOutcome {
                    metrics,
                    episodes_run,
                    interrupted: true,
                });
            }
        }

        info!(
            "Experiment finished: {} episodes, {} updates",
            episodes_run, self.state.num_updates
        );
        Ok(LoopOutcome {
            metrics,
            episodes_run,
            interrupted: false,
        })
    }

    /// Resume from the latest checkpoint if one exists
    fn restore(&mut self) -> Result<()> {
        let Some(checkpoints) = &self.checkpoints else {
            return Ok(());
        };
        if !checkpoints.exists() {
            info!("No checkpoint at {:?}, starting fresh", checkpoints.experiment_path());
            return Ok(());
        }

        let agent = &mut self.agent;
        match checkpoints.load_with(|_, params| agent.restore_parameters(params)) {
            Ok((state, _)) => {
                info!(
                    "Resuming from episode {} ({} updates)",
                    state.start_episode, state.num_updates
                );
                self.state = state;
                Ok(())
            }
            Err(e) if self.config.fresh_on_restore_failure => {
                warn!("Checkpoint restore failed, starting fresh: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write a checkpoint with the resume cursor at `episode`.
    ///
    /// The in-memory cursor only moves once the write has succeeded.
    fn checkpoint(&mut self, episode: usize) -> Result<()> {
        let Some(checkpoints) = &self.checkpoints else {
            return Ok(());
        };

        info!("saving...");
        let mut snapshot = self.state.clone();
        snapshot.start_episode = episode;
        let params = self.agent.parameters().map_err(ExperimentError::Agent)?;

        let paths = checkpoints.save(&snapshot, &params)?;
        self.state.start_episode = episode;
        self.last_checkpoint = Some(paths);
        Ok(())
    }

    fn log_diagnostics(&self, episode: usize, mode: EpisodeMode) {
        let control = mode.control(episode);
        info!(
            episode,
            mode = %mode,
            conv = self.settings.conv,
            discount = self.settings.discount,
            lambda = self.settings.lambda,
            scale_reward = self.state.scale_reward,
            num_updates = self.state.num_updates,
            start_episode = self.state.start_episode,
            "episode {} l rate {:.5} lambda {} epsilon {:.3}",
            episode,
            self.agent.learning_rate(&self.state),
            self.settings.lambda,
            self.agent.epsilon(control, &self.state)
        );
    }

    fn log_progress(
        &self,
        episode: usize,
        mode: EpisodeMode,
        outcome: &EpisodeOutcome,
        metrics: &MetricsTracker,
    ) {
        let control: Control = mode.control(episode);
        let history = metrics.history();
        info!(
            "episode {} t {:.2}=100 steps {:6} reward {:.2} disc_rew {:.2} avg {:.2}, avg100 {:.2}, eps {:.3} \
             updates {:8} tot-steps {:8} epoch {:.1} lr {:.5}",
            episode,
            outcome.time_per_100_steps(),
            outcome.steps,
            history.rewards.last().copied().unwrap_or_default(),
            history.discounted.last().copied().unwrap_or_default(),
            self.state
                .unscale(metrics.smoothed_average().unwrap_or_default()),
            history.rewards.trailing_mean(PROGRESS_WINDOW).unwrap_or_default(),
            self.agent.epsilon(control, &self.state),
            self.state.num_updates,
            metrics.total_steps(),
            self.state.epoch(),
            self.agent.learning_rate(&self.state)
        );
    }

    fn report(&self, outcome: LoopOutcome) -> Report {
        let LoopOutcome {
            metrics,
            episodes_run,
            interrupted,
        } = outcome;
        let total_steps = metrics.total_steps();
        let history = metrics.into_history();

        Report {
            run_id: self.run_id,
            mean_tail_reward: history.rewards.trailing_mean(self.config.eval_tail),
            state: self.state.clone(),
            rewards: history.rewards.to_vec(),
            discounted: history.discounted.to_vec(),
            smoothed: history.smoothed.to_vec(),
            eval_rewards: history.eval_rewards.to_vec(),
            reward_threshold: self.env.spec().reward_threshold,
            episodes_run,
            total_steps,
            interrupted,
        }
    }
}

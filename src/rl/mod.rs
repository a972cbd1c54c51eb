//! Reinforcement Learning Module
//!
//! Episodic experiment runner: an agent is trained against an
//! environment, alternating exploratory and greedy episodes, with
//! resumable checkpoints and background result publishing.
//!
//! # Layout
//!
//! - **core**: agent and environment contracts, resumable training state
//! - **training**: episode loop, rollouts, metrics, checkpoints, publishing
//! - **environment** / **algorithms**: bundled chain task and tabular agent

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod training;

// Config exports
pub use config::{AgentSettings, DriverConfig, PublishConfig, PublishMode};

// Core exports
pub use core::{
    Agent, Control, EnvSpec, Environment, ScheduleParams, StepOutcome, TrainingState, Transition,
};

// Training exports
pub use training::{
    AsyncPublisher, CheckpointCoordinator, EpisodeMode, ExperimentDriver, MetricsTracker, Report,
    RolloutEngine,
};

pub use algorithms::TabularQAgent;
pub use environment::{ChainConfig, ChainEnvironment};

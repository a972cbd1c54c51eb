//! Core RL abstractions
//!
//! Collaborator contracts and the resumable training state.

pub mod agent;
pub mod environment;
pub mod state;

pub use agent::{Agent, Control, Transition};
pub use environment::{EnvSpec, Environment, StepOutcome};
pub use state::{ScheduleParams, TrainingState};

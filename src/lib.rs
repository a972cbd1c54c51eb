pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod rl;

pub use config::{ExperimentConfig, LoggingConfig};
pub use coordination::{install_signal_handlers, ShutdownFlag, ShutdownSignal};
pub use error::{CheckpointError, ExperimentError, Result};
pub use rl::{
    Agent, AgentSettings, CheckpointCoordinator, DriverConfig, Environment, ExperimentDriver,
    Report, TrainingState,
};

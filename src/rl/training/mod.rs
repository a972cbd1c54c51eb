//! Training Infrastructure
//!
//! Episode loop, rollouts, metrics, checkpointing and result publishing.

pub mod checkpointing;
pub mod driver;
pub mod metrics;
pub mod publisher;
pub mod rollout;
pub mod schedule;

pub use checkpointing::{CheckpointCoordinator, CheckpointPaths};
pub use driver::{EnvironmentGuard, ExperimentDriver, Report};
pub use metrics::{EvalPoint, MetricsTracker, RollingHistory, Series};
pub use publisher::{
    copy_publisher, AsyncPublisher, CheckpointSnapshot, PublishCallback, PublishPayload,
};
pub use rollout::{EpisodeOutcome, RolloutEngine, RolloutRequest};
pub use schedule::EpisodeMode;

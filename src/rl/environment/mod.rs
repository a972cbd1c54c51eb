//! Bundled Environments
//!
//! Small simulated tasks used to exercise the experiment driver end to end.

mod chain;

pub use chain::{ChainConfig, ChainEnvironment, BACK, FORWARD, NUM_ACTIONS};

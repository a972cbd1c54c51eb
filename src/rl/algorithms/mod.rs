//! RL Algorithms
//!
//! Agents bundled with the experiment runner.

pub mod tabular_q;

pub use tabular_q::TabularQAgent;

//! Run coordination
//!
//! Cancellation plumbing shared between signal handlers and the driver.

pub mod shutdown;

pub use shutdown::{install_signal_handlers, ShutdownFlag, ShutdownSignal};

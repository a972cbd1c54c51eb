//! Graceful Shutdown
//!
//! Cancellation flag raised by OS signal handlers and checked by the
//! experiment driver at episode boundaries. The driver finishes the
//! current episode, writes a final checkpoint, releases the environment
//! and returns its report.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Urgent shutdown (SIGQUIT)
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

impl ShutdownSignal {
    fn as_u8(self) -> u8 {
        match self {
            ShutdownSignal::Graceful => 1,
            ShutdownSignal::Urgent => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ShutdownSignal::Graceful),
            2 => Some(ShutdownSignal::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    signal: AtomicU8,
}

/// Shared cancellation flag. Clones observe the same request.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<Inner>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// The signal that requested shutdown, if any
    pub fn signal(&self) -> Option<ShutdownSignal> {
        ShutdownSignal::from_u8(self.inner.signal.load(Ordering::SeqCst))
    }

    /// Request shutdown with specified signal type
    pub fn request(&self, signal: ShutdownSignal) {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        self.inner.signal.store(signal.as_u8(), Ordering::SeqCst);
        info!("Shutdown requested: {}", signal);
    }
}

/// Install OS signal handlers that raise `flag`
pub fn install_signal_handlers(flag: ShutdownFlag) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ];

        for (kind, name, shutdown_signal) in handlers {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to install {} handler: {}", name, e);
                    continue;
                }
            };
            let flag = flag.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!("Received {}", name);
                    flag.request(shutdown_signal);
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    flag.request(ShutdownSignal::Graceful);
                }
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        });
    }
}

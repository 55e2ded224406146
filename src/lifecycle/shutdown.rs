//! Shutdown coordination for the relay.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Signal,
    /// A chat message matched a stop keyword.
    ChatCommand,
    /// The tunnel provider exited on its own.
    TunnelLost,
    /// The HTTP listener ended while serving.
    ServerStopped,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal | ShutdownReason::ChatCommand => 0,
            ShutdownReason::TunnelLost | ShutdownReason::ServerStopped => 1,
        }
    }
}

/// Coordinator for shutdown.
///
/// Clones share one cancellation token; the first trigger decides the reason.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the shutdown signal. Returns false if it was already triggered.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        if first {
            tracing::info!(reason = ?reason, "Shutdown requested");
        }
        self.token.cancel();
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Wait until triggered.
    pub async fn wait(&self) -> ShutdownReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(ShutdownReason::Signal)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

//! Lifecycle states and their publication.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Init,
    AcquiringEndpoint,
    Registering,
    Serving,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Init => "INIT",
            LifecycleState::AcquiringEndpoint => "ACQUIRING_ENDPOINT",
            LifecycleState::Registering => "REGISTERING",
            LifecycleState::Serving => "SERVING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Init, AcquiringEndpoint)
                | (AcquiringEndpoint, Registering)
                | (AcquiringEndpoint, Failed)
                | (Registering, Serving)
                | (Registering, Failed)
                | (Serving, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner side of the published state. Readers hold a [`watch::Receiver`].
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<LifecycleState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Init);
        Self { tx }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Apply `next` if the state machine allows it. Returns whether it did.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::debug!(from = %current, to = %next, "Lifecycle transition");
                *current = next;
                applied = true;
            } else {
                tracing::warn!(from = %current, to = %next, "Ignoring invalid lifecycle transition");
            }
            applied
        });
        applied
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

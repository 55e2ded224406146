//! Webhook lifecycle orchestration.
//!
//! # Responsibilities
//! - Resolve the public endpoint: the configured URL, or a fresh tunnel
//! - Register the webhook once an endpoint exists, never before
//! - Undo a started tunnel when registration fails
//! - Deregister and tear the tunnel down exactly once on shutdown
//!
//! # Data Flow
//! ```text
//! INIT → ACQUIRING_ENDPOINT → REGISTERING → SERVING → STOPPING → STOPPED
//!              │                   │
//!              └──────── FAILED ◀──┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use url::Url;

use crate::config::{Config, EndpointSource};
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::lifecycle::state::{LifecycleState, StateCell};
use crate::telegram::{RegistrationError, RegistrationOptions, WebhookRegistrar};
use crate::tunnel::{TunnelError, TunnelSupervisor};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("tunnel establishment failed: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("cannot build webhook URL from '{base}' and '{path}': {source}")]
    WebhookUrl {
        base: String,
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

pub struct LifecycleManager {
    config: Arc<Config>,
    registrar: WebhookRegistrar,
    tunnel: Arc<TunnelSupervisor>,
    state: StateCell,
    shutdown: Shutdown,
    tunnel_started: AtomicBool,
    shutdown_started: AtomicBool,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<Config>,
        registrar: WebhookRegistrar,
        tunnel: Arc<TunnelSupervisor>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            registrar,
            tunnel,
            state: StateCell::new(),
            shutdown,
            tunnel_started: AtomicBool::new(false),
            shutdown_started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Acquire an endpoint and register the webhook. Returns the registered URL.
    pub async fn startup(&self) -> Result<Url, StartupError> {
        self.state.advance(LifecycleState::AcquiringEndpoint);

        let public_url = match &self.config.endpoint_source {
            EndpointSource::Preconfigured(url) => {
                tracing::info!(public_url = %url, "Using pre-configured public endpoint");
                url.clone()
            }
            EndpointSource::Tunnel { auth_token } => {
                let bind = &self.config.bind;
                match self.tunnel.start(&bind.host, bind.port, auth_token).await {
                    Ok(url) => {
                        self.tunnel_started.store(true, Ordering::SeqCst);
                        url
                    }
                    Err(e) => {
                        self.state.advance(LifecycleState::Failed);
                        return Err(e.into());
                    }
                }
            }
        };

        self.state.advance(LifecycleState::Registering);

        let result = match webhook_url(&public_url, &self.config.webhook_path) {
            Ok(url) => {
                let options = RegistrationOptions::from_config(&self.config);
                self.registrar
                    .register(&url, &options)
                    .await
                    .map(|_| url)
                    .map_err(StartupError::from)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(url) => {
                self.state.advance(LifecycleState::Serving);
                tracing::info!(webhook_url = %url, "Serving webhook");
                Ok(url)
            }
            Err(e) => {
                tracing::error!(error = %e, "Webhook registration failed");
                self.stop_tunnel().await;
                self.state.advance(LifecycleState::Failed);
                Err(e)
            }
        }
    }

    /// Resolves when shutdown is requested or the tunnel is lost.
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let lost = self.tunnel.tunnel_lost();
        tokio::select! {
            reason = self.shutdown.wait() => reason,
            _ = lost.cancelled() => {
                self.shutdown.trigger(ShutdownReason::TunnelLost);
                self.shutdown.wait().await
            }
        }
    }

    /// Deregister then stop the tunnel. Runs at most once; returns whether this call ran it.
    pub async fn shutdown(&self, reason: ShutdownReason) -> bool {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown.trigger(reason);
        self.state.advance(LifecycleState::Stopping);
        tracing::info!(reason = ?reason, "Stopping webhook relay");

        if let Err(e) = self.registrar.deregister().await {
            tracing::warn!(error = %e, "Failed to deregister webhook");
        }
        self.stop_tunnel().await;

        self.state.advance(LifecycleState::Stopped);
        true
    }

    async fn stop_tunnel(&self) {
        if self.tunnel_started.swap(false, Ordering::SeqCst) {
            self.tunnel.stop().await;
        }
    }
}

/// RFC 3986 resolution: an absolute `path` replaces whatever path `base` has.
pub fn webhook_url(base: &Url, path: &str) -> Result<Url, StartupError> {
    base.join(path).map_err(|source| StartupError::WebhookUrl {
        base: base.to_string(),
        path: path.to_string(),
        source,
    })
}

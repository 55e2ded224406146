//! Ephemeral reverse tunnel.
//!
//! # Data Flow
//! ```text
//! LifecycleManager
//!     → supervisor.rs (start: connect, normalize to https, bind placeholder)
//!     → TunnelProvider (ngrok.rs spawns and watches the agent)
//!     ← public URL
//!
//! provider exits on its own → supervisor marks dead → tunnel_lost fires
//! ```
//!
//! # Design Decisions
//! - A failed start leaves no handle behind
//! - The placeholder accept loop is unblocked by a cancellation token

pub mod ngrok;
pub mod supervisor;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub use ngrok::NgrokProvider;
pub use supervisor::TunnelSupervisor;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tunnel provider rejected the request: {0}")]
    Rejected(String),

    #[error("no public URL reported within {0:?}")]
    Timeout(Duration),

    #[error("tunnel provider exited before reporting a public URL")]
    Exited,

    #[error("tunnel provider reported an invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("failed to bind tunnel placeholder socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("tunnel is already running")]
    AlreadyRunning,
}

/// What to expose and with which credential.
#[derive(Clone)]
pub struct TunnelRequest {
    pub host: String,
    pub port: u16,
    pub auth_token: String,
}

impl TunnelRequest {
    pub fn new(host: impl Into<String>, port: u16, auth_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            auth_token: auth_token.into(),
        }
    }

    /// `host:port` forwarded to by the provider.
    pub fn upstream(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Debug for TunnelRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// A process or service that publishes a local port on a public URL.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Open the tunnel. Resolves once the public URL is known.
    async fn connect(&self, request: &TunnelRequest) -> Result<Url, TunnelError>;

    /// Tear the session down. No-op when nothing is running.
    async fn kill(&self);

    /// Resolves when the provider session ends, for whatever reason.
    async fn closed(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_brackets_ipv6() {
        assert_eq!(TunnelRequest::new("127.0.0.1", 8443, "t").upstream(), "127.0.0.1:8443");
        assert_eq!(TunnelRequest::new("::1", 443, "t").upstream(), "[::1]:443");
    }

    #[test]
    fn test_debug_redacts_token() {
        let printed = format!("{:?}", TunnelRequest::new("localhost", 80, "2abcSECRET"));
        assert!(!printed.contains("SECRET"));
    }
}

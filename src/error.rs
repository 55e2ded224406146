//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::StartupError;
use crate::telegram::RegistrationError;
use crate::tunnel::TunnelError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("tunnel establishment failed: {0}")]
    TunnelEstablishmentFailed(#[from] TunnelError),

    #[error(transparent)]
    RegistrationFailed(#[from] RegistrationError),

    #[error("{0}")]
    WebhookUrl(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("HTTP server failed: {0}")]
    Server(#[source] std::io::Error),
}

impl From<StartupError> for Error {
    fn from(err: StartupError) -> Self {
        match err {
            StartupError::Tunnel(e) => Error::TunnelEstablishmentFailed(e),
            StartupError::Registration(e) => Error::RegistrationFailed(e),
            e @ StartupError::WebhookUrl { .. } => Error::WebhookUrl(e.to_string()),
        }
    }
}

impl Error {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Configuration(_) | Error::WebhookUrl(_) => 2,
            _ => 1,
        }
    }
}

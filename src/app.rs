//! Service assembly.
//!
//! # Responsibilities
//! - Construct the Bot API client, registrar, tunnel supervisor and lifecycle
//! - Bind the listener before the lifecycle starts
//! - Check in the background which certificate a pre-configured endpoint presents
//! - Drive startup, wait for a shutdown cause, run the shutdown sequence
//!
//! Exiting the process is left to the binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{Config, ConfigWarning, EndpointSource};
use crate::error::Error;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{LifecycleManager, Shutdown, ShutdownReason};
use crate::net::reachability::{self, check_certificate};
use crate::net::{bind_listener, tls::load_tls_config};
use crate::processor::Processor;
use crate::security::RequestAuthenticator;
use crate::telegram::{BotApi, WebhookRegistrar};
use crate::tunnel::{NgrokProvider, TunnelSupervisor};

type ServerTask = JoinHandle<Result<(), std::io::Error>>;

const CERTIFICATE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A bound, not yet started relay.
pub struct Relay {
    listener: TcpListener,
    tls: Option<RustlsConfig>,
    server: HttpServer,
    lifecycle: Arc<LifecycleManager>,
    client: reqwest::Client,
    /// Set when nothing pins the endpoint's certificate.
    certificate_check: Option<Url>,
}

impl Relay {
    pub async fn bind(config: Config) -> Result<Self, Error> {
        let config = Arc::new(config);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .build()
            .map_err(Error::HttpClient)?;
        let api = Arc::new(BotApi::new(
            client.clone(),
            config.api_base.clone(),
            config.bot_token.clone(),
        ));

        let tunnel = Arc::new(TunnelSupervisor::new(Arc::new(NgrokProvider::new(
            &config.ngrok,
        ))));
        let shutdown = Shutdown::new();
        let lifecycle = Arc::new(LifecycleManager::new(
            config.clone(),
            WebhookRegistrar::new(api.clone()),
            tunnel,
            shutdown.clone(),
        ));

        let tls = match &config.tls {
            Some(tls) => Some(load_tls_config(tls).await.map_err(Error::Tls)?),
            None => None,
        };
        let listener = bind_listener(&config.bind.host, config.bind.port)
            .await
            .map_err(|source| Error::Bind {
                address: config.bind.address(),
                source,
            })?;

        let state = AppState {
            authenticator: Arc::new(RequestAuthenticator::new(config.secret_token.clone())),
            processor: Processor::new(config.uses_tunnel()),
            sender: api,
            lifecycle: lifecycle.subscribe(),
            shutdown,
            webhook_path: Arc::from(config.webhook_path.as_str()),
        };
        let server = HttpServer::new(state, &config.server);

        let certificate_check = match &config.endpoint_source {
            EndpointSource::Preconfigured(url) if config.certificate.is_none() => Some(url.clone()),
            _ => None,
        };

        Ok(Self {
            listener,
            tls,
            server,
            lifecycle,
            client,
            certificate_check,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        self.lifecycle.clone()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.lifecycle.shutdown_handle()
    }

    /// Serve, register, and block until a shutdown cause arrives. The shutdown
    /// sequence has completed when this returns `Ok`.
    pub async fn run(self) -> Result<ShutdownReason, Error> {
        let server_stop = CancellationToken::new();
        let mut server: ServerTask =
            tokio::spawn(self.server.run(self.listener, self.tls, server_stop.clone()));

        if let Some(url) = self.certificate_check {
            let client = self.client;
            tokio::spawn(async move {
                let check = check_certificate(&client, &url, CERTIFICATE_CHECK_TIMEOUT).await;
                reachability::report(&url, &check);
            });
        }

        let started = tokio::select! {
            result = self.lifecycle.startup() => result.map_err(Error::from),
            joined = &mut server => Err(server_exit(joined)),
        };
        if let Err(e) = started {
            server_stop.cancel();
            server.abort();
            return Err(e);
        }

        let outcome = tokio::select! {
            reason = self.lifecycle.wait_for_shutdown() => Ok(reason),
            joined = &mut server => Err(server_exit(joined)),
        };

        match outcome {
            Ok(reason) => {
                self.lifecycle.shutdown(reason).await;
                server_stop.cancel();
                Ok(reason)
            }
            Err(e) => {
                tracing::error!(error = %e, "HTTP server stopped unexpectedly");
                self.lifecycle.shutdown(ShutdownReason::ServerStopped).await;
                Err(e)
            }
        }
    }
}

fn server_exit(joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>) -> Error {
    match joined {
        Ok(Ok(())) => Error::Server(std::io::Error::other("HTTP server exited")),
        Ok(Err(e)) => Error::Server(e),
        Err(e) => Error::Server(std::io::Error::other(e.to_string())),
    }
}

/// Log validation findings.
pub fn log_warnings(warnings: &[ConfigWarning]) {
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
}

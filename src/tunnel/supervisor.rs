//! Tunnel supervision.
//!
//! # Responsibilities
//! - Establish the tunnel and normalize its URL to HTTPS
//! - Hold a local placeholder socket for as long as the tunnel is up
//! - Detect the provider dying on its own and raise `tunnel_lost`
//! - Tear everything down on `stop()`, at most once per `start()`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::tunnel::{TunnelError, TunnelProvider, TunnelRequest};

struct TunnelHandle {
    public_url: Url,
    placeholder_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct TunnelSupervisor {
    provider: Arc<dyn TunnelProvider>,
    handle: Mutex<Option<TunnelHandle>>,
    alive: Arc<AtomicBool>,
    lost: CancellationToken,
}

impl TunnelSupervisor {
    pub fn new(provider: Arc<dyn TunnelProvider>) -> Self {
        Self {
            provider,
            handle: Mutex::new(None),
            alive: Arc::new(AtomicBool::new(false)),
            lost: CancellationToken::new(),
        }
    }

    /// Open the tunnel towards `host:port`. Returns the public HTTPS URL.
    pub async fn start(
        &self,
        host: &str,
        port: u16,
        auth_token: &str,
    ) -> Result<Url, TunnelError> {
        if self.is_alive() {
            return Err(TunnelError::AlreadyRunning);
        }

        let request = TunnelRequest::new(host, port, auth_token);
        let reported = self.provider.connect(&request).await.map_err(|e| {
            tracing::error!(error = %e, upstream = %request.upstream(), "Tunnel establishment failed");
            e
        })?;
        let public_url = force_https(reported);

        let (listener, placeholder_addr) = match bind_placeholder(host).await {
            Ok(bound) => bound,
            Err(e) => {
                tracing::error!(error = %e, host = %host, "Failed to bind tunnel placeholder");
                self.provider.kill().await;
                return Err(TunnelError::Bind(e));
            }
        };

        let cancel = CancellationToken::new();
        self.alive.store(true, Ordering::SeqCst);
        let task = tokio::spawn(placeholder_loop(
            listener,
            self.provider.clone(),
            cancel.clone(),
            self.alive.clone(),
            self.lost.clone(),
        ));

        tracing::warn!(
            upstream = %request.upstream(),
            public_url = %public_url,
            "Tunnel established"
        );

        if let Ok(mut handle) = self.handle.lock() {
            *handle = Some(TunnelHandle {
                public_url: public_url.clone(),
                placeholder_addr,
                cancel,
                task,
            });
        }
        Ok(public_url)
    }

    /// Idempotent. Errors while tearing down are logged, never returned.
    pub async fn stop(&self) {
        let Some(handle) = self.handle.lock().ok().and_then(|mut h| h.take()) else {
            return;
        };
        self.alive.store(false, Ordering::SeqCst);
        handle.cancel.cancel();
        self.provider.kill().await;
        if let Err(e) = handle.task.await {
            tracing::warn!(error = %e, "Tunnel placeholder task ended abnormally");
        }
        tracing::info!(public_url = %handle.public_url, "Tunnel stopped");
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Cancelled when the provider exits while the tunnel is supposed to be up.
    pub fn tunnel_lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    pub fn public_url(&self) -> Option<Url> {
        self.handle
            .lock()
            .ok()
            .and_then(|h| h.as_ref().map(|h| h.public_url.clone()))
    }

    pub fn placeholder_addr(&self) -> Option<SocketAddr> {
        self.handle
            .lock()
            .ok()
            .and_then(|h| h.as_ref().map(|h| h.placeholder_addr))
    }
}

async fn placeholder_loop(
    listener: TcpListener,
    provider: Arc<dyn TunnelProvider>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
    lost: CancellationToken,
) {
    let closed = provider.closed();
    tokio::pin!(closed);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut closed => {
                if alive.swap(false, Ordering::SeqCst) {
                    tracing::error!("Tunnel provider exited unexpectedly");
                    lost.cancel();
                }
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "Dropping connection on tunnel placeholder");
                    drop(stream);
                }
                Err(e) => tracing::warn!(error = %e, "Tunnel placeholder accept failed"),
            },
        }
    }
}

// Port 0: the HTTP listener already owns the configured port.
async fn bind_placeholder(host: &str) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind((host, 0)).await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

fn force_https(mut url: Url) -> Url {
    if url.scheme() == "http" {
        // http -> https between special schemes cannot fail.
        let _ = url.set_scheme("https");
    }
    url
}

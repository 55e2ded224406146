//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! TcpListener (bound before startup)
//!     → tls.rs (optional rustls handshake when certificate and private_key are set)
//!     → Hand off to HTTP layer
//! ```

pub mod reachability;
pub mod tls;

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Bind the webhook listener on `host:port`.
pub async fn bind_listener(host: &str, port: u16) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind((host, port)).await?;
    let local: SocketAddr = listener.local_addr()?;
    tracing::info!(address = %local, "Listening for connections");
    Ok(listener)
}

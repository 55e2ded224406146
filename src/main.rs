//! Telegram webhook relay.
//!
//! Receives Bot API updates on an HTTPS webhook, answers each message with a
//! short acknowledgement, and manages the webhook registration for its own
//! lifetime. Without a pre-configured public URL an ngrok tunnel is opened.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!   Telegram      │                   WEBHOOK RELAY                      │
//!   ──────────────┼─▶ net ─▶ http ─▶ security ─▶ processor ─┐            │
//!   (POST update) │              (SERVING gate)             │            │
//!                 │                                         ▼            │
//!   ◀─────────────┼────────────── telegram::api (sendMessage)            │
//!                 │                                                      │
//!                 │  lifecycle ──▶ tunnel (ngrok) ──▶ telegram::registrar│
//!                 │      ▲                                               │
//!                 │  signals / stop keyword / tunnel loss                │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use webhook_relay::app::{log_warnings, Relay};
use webhook_relay::config::load_config;
use webhook_relay::lifecycle::spawn_signal_listener;
use webhook_relay::observability::{logging::init_logging, metrics::init_metrics};

#[derive(Parser)]
#[command(name = "webhook-relay", version)]
#[command(about = "Telegram webhook relay with optional ngrok tunnel", long_about = None)]
struct Cli {
    /// TOML settings file; environment variables override its values.
    #[arg(short, long, env = "WEBHOOK_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    // Skips connection draining; the webhook is already deregistered.
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let validated = match load_config(cli.config.as_deref()) {
        Ok(validated) => validated,
        Err(e) => {
            init_logging(false);
            tracing::error!(error = %e, "Configuration rejected");
            return webhook_relay::Error::from(e).exit_code();
        }
    };
    let config = validated.config;
    init_logging(config.debug);

    tracing::info!("webhook-relay v{} starting", env!("CARGO_PKG_VERSION"));
    log_warnings(&validated.warnings);
    tracing::info!(
        bind_address = %config.bind.address(),
        webhook_path = %config.webhook_path,
        tunnel = config.uses_tunnel(),
        tls = config.tls.is_some(),
        "Configuration loaded"
    );

    if let Some(address) = &config.server.metrics_address {
        match address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(metrics_address = %address, "Failed to parse metrics address"),
        }
    }

    let relay = match Relay::bind(config).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            return e.exit_code();
        }
    };
    spawn_signal_listener(relay.shutdown_handle());

    match relay.run().await {
        Ok(reason) => {
            tracing::info!(reason = ?reason, "Shutdown complete");
            reason.exit_code()
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook relay failed");
            e.exit_code()
        }
    }
}

//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Pick the default filter from the `debug` setting
//!
//! # Design Decisions
//! - `RUST_LOG` always wins over the setting

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "webhook_relay=debug,tower_http=debug"
    } else {
        "webhook_relay=info,tower_http=info"
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(debug: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

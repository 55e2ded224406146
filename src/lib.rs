//! Telegram webhook relay library.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod telegram;

// Webhook lifecycle
pub mod lifecycle;
pub mod tunnel;

// Request handling
pub mod processor;
pub mod security;

// Cross-cutting concerns
pub mod error;
pub mod observability;

pub mod app;

pub use app::Relay;
pub use config::schema::Config;
pub use error::Error;
pub use lifecycle::{LifecycleManager, Shutdown, ShutdownReason};

//! HTTP protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Connection from net layer
//!     → server.rs (axum router, request id, tracing, timeout, body limit)
//!     → webhook.rs (SERVING gate, authentication, parsing, reply)
//!     → status.rs (/, /docs, /health)
//! ```
//!
//! # Design Decisions
//! - The router is built once from immutable state
//! - Per-request errors never take the service down

pub mod server;
pub mod status;
pub mod webhook;

pub use server::{AppState, HttpServer};
pub use webhook::WebhookError;

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming webhook POST:
//!     → authenticator.rs (compare X-Telegram-Bot-Api-Secret-Token)
//!     → 403 on mismatch, otherwise pass to the payload processor
//! ```
//!
//! # Design Decisions
//! - Fail closed: a configured secret rejects missing or malformed headers
//! - Constant-time comparison

pub mod authenticator;

pub use authenticator::{RequestAuthenticator, SECRET_HEADER};

//! Telegram Bot API integration.
//!
//! # Data Flow
//! ```text
//! LifecycleManager → registrar.rs → api.rs (setWebhook / getWebhookInfo)
//! webhook handler  → types.rs (Update) → processor → api.rs (sendMessage)
//! ```

pub mod api;
pub mod registrar;
pub mod types;

pub use api::{ApiAck, ApiError, BotApi, MessageSender, SetWebhook, WebhookApi, WebhookInfo};
pub use registrar::{RegistrationError, RegistrationOptions, WebhookRegistrar};
pub use types::{Chat, Message, Update, User};

//! Payload processing.
//!
//! # Data Flow
//! ```text
//! Update (authenticated, parsed)
//!     → content.rs (first-match classification)
//!     → reply.rs (acknowledgement text, stop-command check)
//!     → Reply { chat_id, text, stop }
//! ```
//!
//! # Design Decisions
//! - Pure functions; sending the reply and acting on `stop` belong to the caller
//! - An unsupported variant still gets a generic acknowledgement

pub mod content;
pub mod reply;

pub use content::{classify, Content, PayloadError};
pub use reply::{is_stop_command, reply_text, stop_reply, STOP_KEYWORDS, UNSUPPORTED_REPLY};

use crate::telegram::types::Message;

/// What to send back for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    /// The message asked the service to shut down.
    pub stop: bool,
    /// Classified variant, `"unsupported"` otherwise.
    pub kind: &'static str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Processor {
    tunnel_in_use: bool,
}

impl Processor {
    pub fn new(tunnel_in_use: bool) -> Self {
        Self { tunnel_in_use }
    }

    pub fn process(&self, message: &Message) -> Result<Reply, PayloadError> {
        let chat_id = message.chat.id;
        let content = match classify(message) {
            Ok(content) => content,
            Err(PayloadError::Unsupported) => {
                tracing::warn!(
                    chat_id,
                    keys = ?message.content.keys().collect::<Vec<_>>(),
                    "Unsupported content variant"
                );
                return Ok(Reply {
                    chat_id,
                    text: UNSUPPORTED_REPLY.to_string(),
                    stop: false,
                    kind: "unsupported",
                });
            }
            Err(err) => return Err(err),
        };

        if let Content::Text(text) = &content {
            if is_stop_command(text) {
                return Ok(Reply {
                    chat_id,
                    text: stop_reply(self.tunnel_in_use),
                    stop: true,
                    kind: content.kind(),
                });
            }
        }

        Ok(Reply {
            chat_id,
            text: reply_text(&content),
            stop: false,
            kind: content.kind(),
        })
    }
}

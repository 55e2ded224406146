//! Inbound update models.
//!
//! Only `chat.id` is required on a message; the remaining keys are kept in
//! `content` so the processor can classify them in its own priority order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope POSTed to the webhook.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub date: Option<i64>,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    /// Every other key of the message object (`text`, `voice`, `photo`, ...).
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: u64,
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Voice {
    pub duration: u32,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Audio {
    pub duration: u32,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Document {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Video {
    pub duration: u32,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub height: u32,
    pub width: u32,
    #[serde(default)]
    pub thumbnail: Option<PhotoSize>,
}

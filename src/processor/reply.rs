//! Acknowledgement texts and the stop-command policy.

use crate::processor::content::Content;

pub const STOP_KEYWORDS: [&str; 3] = ["stop", "exit", "kill"];

pub const UNSUPPORTED_REPLY: &str =
    "Currently supports only text, voice, audio, video, document and photo messages";

/// Case-insensitive substring match against [`STOP_KEYWORDS`].
pub fn is_stop_command(text: &str) -> bool {
    let lowered = text.to_lowercase();
    STOP_KEYWORDS.iter().any(|k| lowered.contains(k))
}

pub fn stop_reply(tunnel_in_use: bool) -> String {
    if tunnel_in_use {
        "Stopping webhook server and ngrok tunnel".to_string()
    } else {
        "Stopping webhook server".to_string()
    }
}

pub fn reply_text(content: &Content) -> String {
    match content {
        Content::Video(_) => "Received a video".to_string(),
        Content::Text(text) => format!("Received {}", text),
        Content::Voice(_) => "Received a voice memo".to_string(),
        Content::Audio(_) => "Received an audio file".to_string(),
        Content::Document(_) => "Received a document".to_string(),
        Content::Photo(_) => "Received a photo".to_string(),
    }
}

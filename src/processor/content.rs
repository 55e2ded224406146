//! Content classification.
//!
//! A message carries one content variant. Keys are checked in the fixed order
//! video, text, voice, audio, document, photo and the first present one wins.
//! A key holding `null`, an empty string or an empty array counts as absent.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::telegram::types::{Audio, Document, Message, PhotoSize, Video, Voice};

/// Variant keys in classification order.
pub const PRIORITY: [&str; 6] = ["video", "text", "voice", "audio", "document", "photo"];

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid update payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed {kind} content: {source}")]
    Variant {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported content variant")]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Video(Video),
    Text(String),
    Voice(Voice),
    Audio(Audio),
    Document(Document),
    Photo(Vec<PhotoSize>),
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Video(_) => "video",
            Content::Text(_) => "text",
            Content::Voice(_) => "voice",
            Content::Audio(_) => "audio",
            Content::Document(_) => "document",
            Content::Photo(_) => "photo",
        }
    }
}

pub fn classify(message: &Message) -> Result<Content, PayloadError> {
    for kind in PRIORITY {
        let Some(value) = message.content.get(kind).filter(|v| is_present(v)) else {
            continue;
        };
        return match kind {
            "video" => decode(kind, value).map(Content::Video),
            "text" => decode(kind, value).map(Content::Text),
            "voice" => decode(kind, value).map(Content::Voice),
            "audio" => decode(kind, value).map(Content::Audio),
            "document" => decode(kind, value).map(Content::Document),
            _ => decode(kind, value).map(Content::Photo),
        };
    }
    Err(PayloadError::Unsupported)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn decode<T: DeserializeOwned>(kind: &'static str, value: &Value) -> Result<T, PayloadError> {
    T::deserialize(value).map_err(|source| PayloadError::Variant { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::types::Update;
    use serde_json::json;

    fn message(content: Value) -> Message {
        let mut body = json!({ "chat": { "id": 1 } });
        if let (Some(target), Some(extra)) = (body.as_object_mut(), content.as_object()) {
            target.extend(extra.clone());
        }
        serde_json::from_value(body).unwrap()
    }

    fn video() -> Value {
        json!({
            "duration": 3, "file_id": "v", "file_unique_id": "u", "file_name": "clip.mp4",
            "file_size": 1024, "mime_type": "video/mp4", "height": 240, "width": 320
        })
    }

    #[test]
    fn test_text() {
        let content = classify(&message(json!({ "text": "hello" }))).unwrap();
        assert_eq!(content, Content::Text("hello".into()));
    }

    #[test]
    fn test_video_wins_over_text() {
        let content = classify(&message(json!({ "text": "caption", "video": video() }))).unwrap();
        assert_eq!(content.kind(), "video");
    }

    #[test]
    fn test_text_wins_over_photo() {
        let photo = json!([{ "file_id": "p", "file_unique_id": "u", "file_size": 1, "height": 1, "width": 1 }]);
        let content = classify(&message(json!({ "photo": photo, "text": "hi" }))).unwrap();
        assert_eq!(content.kind(), "text");
    }

    #[test]
    fn test_photo_set() {
        let photo = json!([
            { "file_id": "a", "file_unique_id": "1", "file_size": 10, "height": 90, "width": 90 },
            { "file_id": "b", "file_unique_id": "2", "file_size": 99, "height": 320, "width": 320 }
        ]);
        match classify(&message(json!({ "photo": photo }))).unwrap() {
            Content::Photo(sizes) => assert_eq!(sizes.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_null_and_empty_are_absent() {
        let content = classify(&message(json!({ "video": null, "text": "", "voice": {
            "duration": 1, "file_id": "f", "file_unique_id": "u", "file_size": 5, "mime_type": "audio/ogg"
        }})))
        .unwrap();
        assert_eq!(content.kind(), "voice");
    }

    #[test]
    fn test_missing_variant_field_is_an_error() {
        let err = classify(&message(json!({ "document": { "file_id": "d" } }))).unwrap_err();
        assert!(matches!(err, PayloadError::Variant { kind: "document", .. }));
    }

    #[test]
    fn test_unsupported() {
        let update: Update = serde_json::from_value(json!({
            "message": { "chat": { "id": 1 }, "sticker": { "file_id": "s" } }
        }))
        .unwrap();
        let err = classify(&update.message.unwrap()).unwrap_err();
        assert!(matches!(err, PayloadError::Unsupported));
    }
}

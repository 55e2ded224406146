//! Webhook endpoint.
//!
//! # Responsibilities
//! - Refuse deliveries until the lifecycle reaches SERVING (503)
//! - Authenticate the secret header (403)
//! - Parse the update (400) and hand it to the processor
//! - Send the acknowledgement, then honour a stop command
//!
//! # Design Decisions
//! - A failed `sendMessage` is logged and still answered 200, so the
//!   platform does not redeliver the same update

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::http::server::AppState;
use crate::lifecycle::{LifecycleState, ShutdownReason};
use crate::observability::metrics;
use crate::processor::PayloadError;
use crate::security::SECRET_HEADER;
use crate::telegram::Update;

/// Per-request failures.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook is not accepting deliveries while {0}")]
    NotReady(LifecycleState),

    #[error("secret token mismatch")]
    AuthenticationFailed,

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::AuthenticationFailed => StatusCode::FORBIDDEN,
            WebhookError::Payload(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            WebhookError::NotReady(_) => "not_ready",
            WebhookError::AuthenticationFailed => "unauthorized",
            WebhookError::Payload(_) => "bad_payload",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        metrics::record_rejected(self.reason());
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

pub async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let current = *state.lifecycle.borrow();
    if current != LifecycleState::Serving {
        tracing::debug!(state = %current, "Delivery refused before SERVING");
        return Err(WebhookError::NotReady(current));
    }

    let provided = headers.get(SECRET_HEADER).map(|v| v.as_bytes());
    if !state.authenticator.authenticate(provided) {
        tracing::warn!(header_present = provided.is_some(), "Secret token mismatch");
        return Err(WebhookError::AuthenticationFailed);
    }

    let update: Update = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Undecodable update");
        PayloadError::Decode(e)
    })?;

    let Some(message) = update.message else {
        tracing::debug!(update_id = ?update.update_id, "Ignoring update without a message");
        return Ok(StatusCode::OK);
    };

    let reply = state.processor.process(&message).map_err(|e| {
        tracing::warn!(error = %e, chat_id = message.chat.id, "Malformed message content");
        e
    })?;
    metrics::record_update(reply.kind);
    tracing::info!(chat_id = reply.chat_id, kind = reply.kind, "Message received");

    match state.sender.send_message(reply.chat_id, &reply.text).await {
        Ok(()) => metrics::record_reply("sent"),
        Err(e) => {
            metrics::record_reply("failed");
            tracing::error!(error = %e, chat_id = reply.chat_id, "Failed to send reply");
        }
    }

    if reply.stop {
        tracing::warn!(chat_id = reply.chat_id, "Stop command received");
        state.shutdown.trigger(ShutdownReason::ChatCommand);
    }

    Ok(StatusCode::OK)
}

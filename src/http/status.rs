//! Service description and health routes.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect},
    Json,
};
use serde_json::{json, Value};

use crate::http::server::AppState;

/// `GET /` → `/docs`.
pub async fn index() -> Redirect {
    Redirect::temporary("/docs")
}

pub async fn docs(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "routes": [
            { "method": "POST", "path": &*state.webhook_path, "description": "Telegram webhook deliveries" },
            { "method": "GET", "path": "/health", "description": "Lifecycle state" },
            { "method": "GET", "path": "/docs", "description": "This document" },
        ],
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let current = *state.lifecycle.borrow();
    Json(json!({ "state": current }))
}

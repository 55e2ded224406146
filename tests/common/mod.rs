//! Shared utilities for integration testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

use webhook_relay::config::Config;
use webhook_relay::lifecycle::{LifecycleManager, LifecycleState};

/// Calls received by the mock Bot API.
#[derive(Default)]
pub struct Recorded {
    pub set_webhook: Mutex<Vec<HashMap<String, String>>>,
    pub messages: Mutex<Vec<Value>>,
    /// `(file_name, bytes)` of every uploaded `certificate` part.
    pub certificates: Mutex<Vec<(Option<String>, Vec<u8>)>>,
    pub reject_registration: AtomicBool,
}

impl Recorded {
    pub fn webhook_urls(&self) -> Vec<String> {
        self.set_webhook
            .lock()
            .unwrap()
            .iter()
            .map(|form| form.get("url").cloned().unwrap_or_default())
            .collect()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }
}

pub struct MockTelegram {
    pub base: Url,
    pub recorded: Arc<Recorded>,
}

async fn read_fields(recorded: &Recorded, request: Request) -> HashMap<String, String> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    if !is_multipart {
        let Form(form) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .unwrap();
        return form;
    }

    let mut multipart = Multipart::from_request(request, &()).await.unwrap();
    let mut form = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "certificate" {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.unwrap();
            recorded.certificates.lock().unwrap().push((file_name, bytes.to_vec()));
        } else {
            form.insert(name, field.text().await.unwrap());
        }
    }
    form
}

async fn set_webhook(State(recorded): State<Arc<Recorded>>, request: Request) -> Json<Value> {
    let form = read_fields(&recorded, request).await;
    let clearing = form.get("url").map_or(true, |u| u.is_empty());
    recorded.set_webhook.lock().unwrap().push(form);
    if !clearing && recorded.reject_registration.load(Ordering::SeqCst) {
        return Json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: bad webhook: Failed to resolve host"
        }));
    }
    let description = if clearing { "Webhook was deleted" } else { "Webhook was set" };
    Json(json!({ "ok": true, "result": true, "description": description }))
}

async fn send_message(State(recorded): State<Arc<Recorded>>, Json(body): Json<Value>) -> Json<Value> {
    recorded.messages.lock().unwrap().push(body.clone());
    Json(json!({
        "ok": true,
        "result": { "message_id": 1, "date": 0, "chat": { "id": body["chat_id"] }, "text": body["text"] }
    }))
}

async fn get_webhook_info(State(recorded): State<Arc<Recorded>>) -> Json<Value> {
    let url = recorded.webhook_urls().last().cloned().unwrap_or_default();
    Json(json!({ "ok": true, "result": { "url": url, "has_custom_certificate": false, "pending_update_count": 0 } }))
}

/// Start a mock Bot API on an ephemeral port.
pub async fn start_mock_telegram() -> MockTelegram {
    let recorded = Arc::new(Recorded::default());
    let app = Router::new()
        .route("/{bot}/setWebhook", post(set_webhook))
        .route("/{bot}/sendMessage", post(send_message))
        .route("/{bot}/getWebhookInfo", get(get_webhook_info))
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockTelegram {
        base: Url::parse(&format!("http://{}", addr)).unwrap(),
        recorded,
    }
}

/// Pre-configured endpoint pointing at the mock, listening on an ephemeral port.
pub fn relay_config(mock: &MockTelegram) -> Config {
    let mut config = Config::with_public_url("T", Url::parse("https://example.com").unwrap());
    config.bind.port = 0;
    config.api_base = mock.base.clone();
    config
}

/// Wait until the lifecycle reaches `target`.
pub async fn wait_for_state(lifecycle: &LifecycleManager, target: LifecycleState) {
    let mut rx = lifecycle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for lifecycle state")
        .expect("lifecycle dropped");
}

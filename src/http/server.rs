//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router with the webhook and status handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Serve on a pre-bound listener, over plain HTTP or rustls

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerSettings;
use crate::http::{status, webhook};
use crate::lifecycle::{LifecycleState, Shutdown};
use crate::processor::Processor;
use crate::security::RequestAuthenticator;
use crate::telegram::MessageSender;

/// In-flight requests get this long once shutdown starts (TLS listener only).
const TLS_DRAIN: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<RequestAuthenticator>,
    pub processor: Processor,
    pub sender: Arc<dyn MessageSender>,
    pub lifecycle: watch::Receiver<LifecycleState>,
    pub shutdown: Shutdown,
    pub webhook_path: Arc<str>,
}

/// HTTP server for the webhook relay.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, settings: &ServerSettings) -> Self {
        Self {
            router: Self::build_router(state, settings),
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, settings: &ServerSettings) -> Router {
        let webhook_path = state.webhook_path.clone();
        Router::new()
            .route(&webhook_path, post(webhook::handle_update))
            .route("/", get(status::index))
            .route("/docs", get(status::docs))
            .route("/health", get(status::health))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id,
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(settings.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        settings.request_timeout_secs,
                    ))),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(
        self,
        listener: TcpListener,
        tls: Option<RustlsConfig>,
        shutdown: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = tls.is_some(), "HTTP server starting");

        match tls {
            None => {
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await?;
            }
            Some(tls) => {
                let handle = axum_server::Handle::new();
                let trigger = handle.clone();
                tokio::spawn(async move {
                    shutdown.cancelled().await;
                    trigger.graceful_shutdown(Some(TLS_DRAIN));
                });
                axum_server::from_tcp_rustls(listener.into_std()?, tls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ShutdownReason;
    use crate::telegram::ApiError;
    use async_trait::async_trait;
    use axum::http::{header, StatusCode};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ApiError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            if self.fail {
                return Err(ApiError::Rejected {
                    method: "sendMessage",
                    code: Some(400),
                    description: "Bad Request: chat not found".into(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        router: Router,
        sender: Arc<RecordingSender>,
        state_tx: watch::Sender<LifecycleState>,
        shutdown: Shutdown,
    }

    fn harness(secret: Option<&str>, sender: RecordingSender) -> Harness {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Serving);
        let sender = Arc::new(sender);
        let shutdown = Shutdown::new();
        let state = AppState {
            authenticator: Arc::new(RequestAuthenticator::new(secret.map(String::from))),
            processor: Processor::new(false),
            sender: sender.clone(),
            lifecycle: state_rx,
            shutdown: shutdown.clone(),
            webhook_path: Arc::from("/telegram-webhook"),
        };
        Harness {
            router: HttpServer::new(state, &ServerSettings::default()).router(),
            sender,
            state_tx,
            shutdown,
        }
    }

    fn post(body: &str) -> Request<Body> {
        Request::post("/telegram-webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const HELLO: &str = r#"{"message":{"chat":{"id":42},"text":"hello"}}"#;

    #[tokio::test]
    async fn test_text_is_acknowledged() {
        let h = harness(None, RecordingSender::default());
        let response = h.router.oneshot(post(HELLO)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            *h.sender.sent.lock().unwrap(),
            vec![(42, "Received hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let h = harness(None, RecordingSender::default());
        let body = "x".repeat(ServerSettings::default().max_body_size + 1);
        let request = Request::post("/telegram-webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let response = h.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_serving_returns_503() {
        let h = harness(None, RecordingSender::default());
        h.state_tx.send_replace(LifecycleState::Registering);

        let response = h.router.oneshot(post(HELLO)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_secret_returns_403() {
        let h = harness(Some("S"), RecordingSender::default());
        let response = h.router.oneshot(post(HELLO)).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_matching_secret_is_accepted() {
        let h = harness(Some("S"), RecordingSender::default());
        let mut request = post(HELLO);
        request
            .headers_mut()
            .insert("x-telegram-bot-api-secret-token", "S".parse().unwrap());

        let response = h.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_json_returns_400() {
        let h = harness(None, RecordingSender::default());
        let response = h.router.oneshot(post("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["detail"].as_str().unwrap().contains("invalid update payload"));
    }

    #[tokio::test]
    async fn test_update_without_message_is_ignored() {
        let h = harness(None, RecordingSender::default());
        let response = h
            .router
            .oneshot(post(r#"{"update_id":1,"edited_message":{"chat":{"id":1}}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_still_returns_200() {
        let h = harness(
            None,
            RecordingSender {
                fail: true,
                ..RecordingSender::default()
            },
        );
        let response = h.router.oneshot(post(HELLO)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_command_triggers_shutdown() {
        let h = harness(None, RecordingSender::default());
        let response = h
            .router
            .oneshot(post(r#"{"message":{"chat":{"id":42},"text":"please stop now"}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.shutdown.reason(), Some(ShutdownReason::ChatCommand));
        assert_eq!(h.sender.sent.lock().unwrap()[0].1, "Stopping webhook server");
    }

    #[tokio::test]
    async fn test_index_redirects_to_docs() {
        let h = harness(None, RecordingSender::default());
        let request = Request::get("/").body(Body::empty()).unwrap();
        let response = h.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/docs");
    }

    #[tokio::test]
    async fn test_docs_lists_webhook_route() {
        let h = harness(None, RecordingSender::default());
        let request = Request::get("/docs").body(Body::empty()).unwrap();
        let response = h.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["routes"][0]["path"], "/telegram-webhook");
    }

    #[tokio::test]
    async fn test_health_reports_state() {
        let h = harness(None, RecordingSender::default());
        h.state_tx.send_replace(LifecycleState::Stopping);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let response = h.router.oneshot(request).await.unwrap();

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["state"], "STOPPING");
    }
}

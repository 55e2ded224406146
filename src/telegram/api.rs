//! Bot API client.
//!
//! # Responsibilities
//! - Build `{api_base}/bot{token}/{method}` URLs
//! - Encode `setWebhook` as a form or, with a certificate, as multipart
//! - Decode the `{ok, result, description, error_code}` envelope
//!
//! The client is constructed explicitly and owned by whoever needs it; the
//! registrar and the reply sender only see it through [`WebhookApi`] and
//! [`MessageSender`].

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors returned by Bot API calls. Never contains the bot token.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned HTTP {status} with an undecodable body")]
    Decode {
        method: &'static str,
        status: StatusCode,
    },

    #[error(
        "{method} rejected (error_code {}): {description}",
        .code.map_or_else(|| "none".to_string(), |c| c.to_string())
    )]
    Rejected {
        method: &'static str,
        code: Option<i64>,
        description: String,
    },

    #[error("failed to read certificate {}: {source}", .path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Successful reply of a call whose result is a bare `true`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiAck {
    /// Human readable note, e.g. "Webhook was set" or "Webhook is already deleted".
    pub description: Option<String>,
}

/// `getWebhookInfo` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookInfo {
    pub url: String,
    pub has_custom_certificate: bool,
    pub pending_update_count: u64,
    pub ip_address: Option<String>,
    pub last_error_date: Option<i64>,
    pub last_error_message: Option<String>,
    pub max_connections: Option<u32>,
    pub allowed_updates: Option<Vec<String>>,
}

impl WebhookInfo {
    pub fn is_registered(&self) -> bool {
        !self.url.is_empty()
    }
}

/// `setWebhook` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetWebhook {
    /// Empty string clears the registration.
    pub url: String,
    pub secret_token: Option<String>,
    pub drop_pending_updates: Option<bool>,
    pub max_connections: Option<u32>,
    pub allowed_updates: Option<Vec<String>>,
    pub ip_address: Option<IpAddr>,
    /// Public key certificate uploaded as multipart.
    pub certificate: Option<PathBuf>,
}

impl SetWebhook {
    /// Parameters that remove the current webhook.
    pub fn clear() -> Self {
        Self::default()
    }

    /// Text fields in wire format; `allowed_updates` is a JSON-encoded array.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("url", self.url.clone())];
        if let Some(token) = &self.secret_token {
            fields.push(("secret_token", token.clone()));
        }
        if let Some(drop) = self.drop_pending_updates {
            fields.push(("drop_pending_updates", drop.to_string()));
        }
        if let Some(max) = self.max_connections {
            fields.push(("max_connections", max.to_string()));
        }
        if let Some(updates) = &self.allowed_updates {
            let encoded = serde_json::to_string(updates).unwrap_or_else(|_| "[]".into());
            fields.push(("allowed_updates", encoded));
        }
        if let Some(ip) = self.ip_address {
            fields.push(("ip_address", ip.to_string()));
        }
        fields
    }
}

/// Webhook management calls used by the registrar.
#[async_trait]
pub trait WebhookApi: Send + Sync {
    async fn set_webhook(&self, request: &SetWebhook) -> Result<ApiAck, ApiError>;
    async fn get_webhook_info(&self) -> Result<WebhookInfo, ApiError>;
}

/// Outbound replies.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ApiError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// HTTP implementation of the Bot API.
#[derive(Clone)]
pub struct BotApi {
    client: Client,
    api_base: Url,
    token: String,
}

impl fmt::Debug for BotApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotApi")
            .field("api_base", &self.api_base.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl BotApi {
    pub fn new(client: Client, api_base: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            api_base,
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.as_str().trim_end_matches('/'),
            self.token,
            method
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<(T, Option<String>), ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Transport {
            method,
            source: source.without_url(),
        })?;
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|_| ApiError::Decode { method, status })?;

        if !body.ok {
            return Err(ApiError::Rejected {
                method,
                code: body.error_code.or(Some(i64::from(status.as_u16()))),
                description: body.description.unwrap_or_else(|| "unknown error".into()),
            });
        }
        match body.result {
            Some(result) => Ok((result, body.description)),
            None => Err(ApiError::Decode { method, status }),
        }
    }

    async fn multipart_form(request: &SetWebhook, path: &Path) -> Result<Form, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ApiError::Certificate {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "certificate.pem".into());

        let mut form = Form::new();
        for (name, value) in request.form_fields() {
            form = form.text(name, value);
        }
        Ok(form.part("certificate", Part::bytes(bytes).file_name(file_name)))
    }
}

#[async_trait]
impl WebhookApi for BotApi {
    async fn set_webhook(&self, request: &SetWebhook) -> Result<ApiAck, ApiError> {
        let builder = self.client.post(self.method_url("setWebhook"));
        let builder = match &request.certificate {
            Some(path) => builder.multipart(Self::multipart_form(request, path).await?),
            None => builder.form(&request.form_fields()),
        };
        let (_ok, description): (bool, _) = self.call("setWebhook", builder).await?;
        Ok(ApiAck { description })
    }

    async fn get_webhook_info(&self) -> Result<WebhookInfo, ApiError> {
        let builder = self.client.get(self.method_url("getWebhookInfo"));
        let (info, _) = self.call("getWebhookInfo", builder).await?;
        Ok(info)
    }
}

#[async_trait]
impl MessageSender for BotApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ApiError> {
        let builder = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text });
        let (_message, _): (serde_json::Value, _) = self.call("sendMessage", builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_url_strips_trailing_slash() {
        let api = BotApi::new(
            Client::new(),
            Url::parse("https://api.telegram.org/").unwrap(),
            "T",
        );
        assert_eq!(
            api.method_url("setWebhook"),
            "https://api.telegram.org/botT/setWebhook"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let api = BotApi::new(
            Client::new(),
            Url::parse("https://api.telegram.org").unwrap(),
            "123:SECRET",
        );
        let printed = format!("{:?}", api);
        assert!(!printed.contains("SECRET"));
    }

    #[test]
    fn test_form_fields_full() {
        let request = SetWebhook {
            url: "https://example.com/telegram-webhook".into(),
            secret_token: Some("S".into()),
            drop_pending_updates: Some(true),
            max_connections: Some(40),
            allowed_updates: Some(vec!["message".into()]),
            ip_address: Some("203.0.113.7".parse().unwrap()),
            certificate: None,
        };
        assert_eq!(
            request.form_fields(),
            vec![
                ("url", "https://example.com/telegram-webhook".to_string()),
                ("secret_token", "S".to_string()),
                ("drop_pending_updates", "true".to_string()),
                ("max_connections", "40".to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
                ("ip_address", "203.0.113.7".to_string()),
            ]
        );
    }

    #[test]
    fn test_clear_only_sends_empty_url() {
        assert_eq!(SetWebhook::clear().form_fields(), vec![("url", String::new())]);
    }

    #[test]
    fn test_response_envelope() {
        let body = json!({ "ok": true, "result": { "url": "https://example" } });
        let parsed: ApiResponse<WebhookInfo> = serde_json::from_value(body).unwrap();
        assert!(parsed.ok);
        assert!(parsed.result.unwrap().is_registered());

        let body = json!({ "ok": false, "error_code": 401, "description": "Unauthorized" });
        let parsed: ApiResponse<WebhookInfo> = serde_json::from_value(body).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error_code, Some(401));
    }

    #[test]
    fn test_rejected_display() {
        let err = ApiError::Rejected {
            method: "setWebhook",
            code: Some(400),
            description: "Bad Request: bad webhook".into(),
        };
        assert_eq!(
            err.to_string(),
            "setWebhook rejected (error_code 400): Bad Request: bad webhook"
        );
    }
}

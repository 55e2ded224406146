//! Webhook registration.
//!
//! # Responsibilities
//! - Point the bot at a public HTTPS URL (`setWebhook`)
//! - Clear the registration on shutdown (`setWebhook` with an empty URL)
//! - Report the remote view of the registration (`getWebhookInfo`)
//!
//! # Design Decisions
//! - Nothing is cached locally; every call is authoritative
//! - Non-HTTPS URLs are refused before any network call

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::config::{Config, DeliveryOptions};
use crate::telegram::api::{ApiAck, ApiError, SetWebhook, WebhookApi, WebhookInfo};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("refusing to register non-HTTPS webhook URL: {0}")]
    InsecureUrl(String),

    #[error("registration failed: {0}")]
    Api(#[from] ApiError),
}

/// Everything `setWebhook` takes besides the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOptions {
    pub secret_token: Option<String>,
    pub drop_pending_updates: bool,
    pub max_connections: u32,
    pub allowed_updates: Vec<String>,
    pub certificate: Option<PathBuf>,
    pub ip_address: Option<IpAddr>,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        let delivery = DeliveryOptions::default();
        Self {
            secret_token: None,
            drop_pending_updates: delivery.drop_pending_updates,
            max_connections: delivery.max_connections,
            allowed_updates: delivery.allowed_updates,
            certificate: None,
            ip_address: None,
        }
    }
}

impl RegistrationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secret_token: config.secret_token.clone(),
            drop_pending_updates: config.delivery.drop_pending_updates,
            max_connections: config.delivery.max_connections,
            allowed_updates: config.delivery.allowed_updates.clone(),
            certificate: config.certificate.clone(),
            ip_address: config.delivery.ip_address,
        }
    }
}

/// Registers and clears the bot's webhook.
#[derive(Clone)]
pub struct WebhookRegistrar {
    api: Arc<dyn WebhookApi>,
}

impl WebhookRegistrar {
    pub fn new(api: Arc<dyn WebhookApi>) -> Self {
        Self { api }
    }

    pub async fn register(
        &self,
        public_url: &Url,
        options: &RegistrationOptions,
    ) -> Result<ApiAck, RegistrationError> {
        if public_url.scheme() != "https" {
            return Err(RegistrationError::InsecureUrl(public_url.to_string()));
        }

        let request = SetWebhook {
            url: public_url.to_string(),
            secret_token: options.secret_token.clone(),
            drop_pending_updates: Some(options.drop_pending_updates),
            max_connections: Some(options.max_connections),
            allowed_updates: Some(options.allowed_updates.clone()),
            ip_address: options.ip_address,
            certificate: options.certificate.clone(),
        };

        let ack = self.api.set_webhook(&request).await?;
        tracing::info!(
            url = %public_url,
            custom_certificate = options.certificate.is_some(),
            description = ack.description.as_deref().unwrap_or(""),
            "Webhook registered"
        );
        Ok(ack)
    }

    /// Safe to call repeatedly; the platform answers "Webhook is already deleted".
    pub async fn deregister(&self) -> Result<ApiAck, RegistrationError> {
        let ack = self.api.set_webhook(&SetWebhook::clear()).await?;
        tracing::info!(
            description = ack.description.as_deref().unwrap_or(""),
            "Webhook deregistered"
        );
        Ok(ack)
    }

    pub async fn query_status(&self) -> Result<WebhookInfo, RegistrationError> {
        Ok(self.api.get_webhook_info().await?)
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve the endpoint source (pre-configured URL beats tunnel credential)
//! - Derive dependent fields (certificate, TLS) before `Config` exists
//! - Surface security smells as warnings instead of errors
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: `RawSettings → Result<ValidatedConfig, Vec<ValidationError>>`
//! - No network calls; the filesystem is only touched to check that
//!   certificate and key files exist

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::config::schema::{
    BindConfig, Config, DeliveryOptions, EndpointSource, RawSettings, TlsConfig, ALLOWED_PORTS,
};
use crate::net::reachability::SELF_SIGNED_HINT;

/// Paths served by the relay itself.
pub const RESERVED_PATHS: [&str; 3] = ["/", "/docs", "/health"];

/// Maximum length of a `secret_token` accepted by the Bot API.
pub const MAX_SECRET_TOKEN_LEN: usize = 256;

/// A single semantic problem with the settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bot_token is required")]
    MissingBotToken,

    #[error("either a pre-configured webhook or an ngrok auth token is required")]
    MissingEndpointSource,

    #[error("webhook '{value}' is not a valid URL: {reason}")]
    InvalidWebhookUrl { value: String, reason: String },

    #[error("pre-configured webhook '{0}' must use https")]
    InsecureWebhookUrl(String),

    #[error("endpoint '{0}' must start with '/'")]
    InvalidEndpointPath(String),

    #[error("endpoint '{0}' collides with a built-in route")]
    ReservedEndpointPath(String),

    #[error("endpoint '{0}' must be a literal path without captures, wildcards, query or fragment")]
    UnroutableEndpointPath(String),

    #[error("host must not be empty")]
    EmptyHost,

    #[error("port {0} is not accepted by the Bot API (allowed: 80, 88, 443, 8443)")]
    PortNotAllowed(u16),

    #[error("certificate '{}' does not exist", .0.display())]
    CertificateNotFound(PathBuf),

    #[error("private_key '{}' does not exist", .0.display())]
    PrivateKeyNotFound(PathBuf),

    #[error("private_key is set but certificate is missing")]
    PrivateKeyWithoutCertificate,

    #[error("secret_token must be 1-256 characters from A-Z, a-z, 0-9, '_' and '-'")]
    InvalidSecretToken,

    #[error("max_connections {0} is outside 1..=100")]
    MaxConnectionsOutOfRange(u32),

    #[error("webhook_ip '{0}' is not a valid IP address")]
    InvalidWebhookIp(String),

    #[error("api_base '{0}' is not a valid URL")]
    InvalidApiBase(String),
}

/// Non-fatal findings, logged once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Inbound requests cannot be authenticated.
    MissingSecretToken,
    /// A pre-configured endpoint without a pinned certificate must present a CA-signed one.
    /// Whether it does is checked over the network once the relay runs.
    UntrustedCertificate { url: Url },
    /// ngrok terminates TLS with a trusted CA, the certificate is not uploaded.
    CertificateIgnoredForNgrok,
    /// Local TLS termination is skipped because the tunnel forwards plain HTTP.
    TlsIgnoredForTunnel,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::MissingSecretToken => write!(
                f,
                "secret_token is not set; it is highly recommended to set one so only the registered webhook can reach the bot"
            ),
            ConfigWarning::UntrustedCertificate { url } => write!(
                f,
                "no certificate set, so '{url}' must present one signed by a trusted CA; otherwise create a self-signed one with \
                 '{SELF_SIGNED_HINT}' and set certificate"
            ),
            ConfigWarning::CertificateIgnoredForNgrok => write!(
                f,
                "certificate is not required for an ngrok endpoint, it uses a trusted CA"
            ),
            ConfigWarning::TlsIgnoredForTunnel => write!(
                f,
                "private_key is ignored in tunnel mode, the tunnel forwards plain HTTP"
            ),
        }
    }
}

/// Result of a successful validation pass.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

/// The router treats `{`, `}` and segments opening with `:` or `*` as patterns.
fn is_literal_route(path: &str) -> bool {
    let forbidden = |c: char| matches!(c, '{' | '}' | '?' | '#') || c.is_whitespace();
    !path.contains(forbidden)
        && path
            .split('/')
            .all(|segment| !segment.starts_with(':') && !segment.starts_with('*'))
}

/// Validate raw settings and build the immutable [`Config`].
pub fn validate_settings(raw: RawSettings) -> Result<ValidatedConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let bot_token = raw.bot_token.trim().to_string();
    if bot_token.is_empty() {
        errors.push(ValidationError::MissingBotToken);
    }

    let ngrok_token = non_empty(raw.ngrok_token);
    let webhook = match non_empty(raw.webhook) {
        Some(value) => match Url::parse(&value) {
            Ok(url) if url.scheme() == "https" => Some(url),
            Ok(url) if url.scheme() == "http" => {
                errors.push(ValidationError::InsecureWebhookUrl(value));
                None
            }
            Ok(url) => {
                errors.push(ValidationError::InvalidWebhookUrl {
                    value,
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
                None
            }
            Err(e) => {
                errors.push(ValidationError::InvalidWebhookUrl {
                    value,
                    reason: e.to_string(),
                });
                None
            }
        },
        None => None,
    };

    // A rejected webhook already produced an error; only report a missing source
    // when nothing was supplied at all.
    let endpoint_source = match (webhook, ngrok_token.clone()) {
        (Some(url), _) => Some(EndpointSource::Preconfigured(url)),
        (None, Some(auth_token)) => Some(EndpointSource::Tunnel { auth_token }),
        (None, None) => {
            let webhook_rejected = errors.iter().any(|e| {
                matches!(
                    e,
                    ValidationError::InsecureWebhookUrl(_) | ValidationError::InvalidWebhookUrl { .. }
                )
            });
            if !webhook_rejected {
                errors.push(ValidationError::MissingEndpointSource);
            }
            None
        }
    };

    if !raw.endpoint.starts_with('/') {
        errors.push(ValidationError::InvalidEndpointPath(raw.endpoint.clone()));
    } else if RESERVED_PATHS.contains(&raw.endpoint.as_str()) {
        errors.push(ValidationError::ReservedEndpointPath(raw.endpoint.clone()));
    } else if !is_literal_route(&raw.endpoint) {
        errors.push(ValidationError::UnroutableEndpointPath(raw.endpoint.clone()));
    }

    let host = raw.host.trim().to_string();
    if host.is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if !ALLOWED_PORTS.contains(&raw.port) {
        errors.push(ValidationError::PortNotAllowed(raw.port));
    }

    if let Some(path) = &raw.certificate {
        if !path.is_file() {
            errors.push(ValidationError::CertificateNotFound(path.clone()));
        }
    }
    if let Some(path) = &raw.private_key {
        if raw.certificate.is_none() {
            errors.push(ValidationError::PrivateKeyWithoutCertificate);
        } else if !path.is_file() {
            errors.push(ValidationError::PrivateKeyNotFound(path.clone()));
        }
    }

    let secret_token = non_empty(raw.secret_token);
    match &secret_token {
        Some(token) if !is_valid_secret_token(token) => {
            errors.push(ValidationError::InvalidSecretToken);
        }
        Some(_) => {}
        None => warnings.push(ConfigWarning::MissingSecretToken),
    }

    if !(1..=100).contains(&raw.max_connections) {
        errors.push(ValidationError::MaxConnectionsOutOfRange(raw.max_connections));
    }

    let ip_address = match non_empty(raw.webhook_ip) {
        Some(value) => match value.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                errors.push(ValidationError::InvalidWebhookIp(value));
                None
            }
        },
        None => None,
    };

    let api_base = match Url::parse(&raw.api_base) {
        Ok(url) => Some(url),
        Err(_) => {
            errors.push(ValidationError::InvalidApiBase(raw.api_base.clone()));
            None
        }
    };

    let (Some(endpoint_source), Some(api_base), true) =
        (endpoint_source, api_base, errors.is_empty())
    else {
        return Err(errors);
    };

    let mut certificate = raw.certificate;
    let mut tls = match (&certificate, raw.private_key) {
        (Some(cert_path), Some(key_path)) => Some(TlsConfig {
            cert_path: cert_path.clone(),
            key_path,
        }),
        _ => None,
    };

    match &endpoint_source {
        EndpointSource::Preconfigured(url) if is_ngrok_host(url) => {
            if certificate.take().is_some() {
                warnings.push(ConfigWarning::CertificateIgnoredForNgrok);
            }
            tls = None;
        }
        EndpointSource::Preconfigured(url) => {
            if certificate.is_none() && ngrok_token.is_none() {
                warnings.push(ConfigWarning::UntrustedCertificate { url: url.clone() });
            }
        }
        EndpointSource::Tunnel { .. } => {
            if tls.take().is_some() {
                warnings.push(ConfigWarning::TlsIgnoredForTunnel);
            }
        }
    }

    let config = Config {
        bot_token,
        endpoint_source,
        bind: BindConfig {
            host,
            port: raw.port,
        },
        webhook_path: raw.endpoint,
        certificate,
        tls,
        secret_token,
        delivery: DeliveryOptions {
            drop_pending_updates: raw.drop_pending_updates,
            max_connections: raw.max_connections,
            allowed_updates: raw.allowed_updates,
            ip_address,
        },
        debug: raw.debug,
        api_base,
        ngrok: raw.ngrok,
        server: raw.server,
    };

    Ok(ValidatedConfig { config, warnings })
}

/// `^[A-Za-z0-9_-]{1,256}$`
pub fn is_valid_secret_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_SECRET_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn is_ngrok_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| host.to_ascii_lowercase().contains("ngrok"))
        .unwrap_or(false)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

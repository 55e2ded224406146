//! Configuration schema definitions.
//!
//! `RawSettings` is the on-disk/environment shape and derives Serde traits so it
//! can be read from a TOML file. `Config` is the validated, immutable value the
//! rest of the crate consumes; it is only produced by
//! [`validate_settings`](crate::config::validation::validate_settings).

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default path the webhook handler is mounted on.
pub const DEFAULT_WEBHOOK_PATH: &str = "/telegram-webhook";

/// Default Bot API root.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Ports the Bot API accepts for webhooks.
pub const ALLOWED_PORTS: [u16; 4] = [80, 88, 443, 8443];

/// Unvalidated settings as read from the config file and environment.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RawSettings {
    /// Bot credential issued by BotFather.
    pub bot_token: String,

    /// ngrok auth token, used when no pre-configured webhook is set.
    pub ngrok_token: Option<String>,

    /// Pre-configured public base URL (must be HTTPS).
    pub webhook: Option<String>,

    /// Path the webhook handler is mounted on.
    pub endpoint: String,

    /// Bind host for the local listener.
    pub host: String,

    /// Bind port for the local listener.
    pub port: u16,

    /// Public certificate uploaded to the Bot API (self-signed pinning).
    pub certificate: Option<PathBuf>,

    /// Private key matching `certificate`; enables local TLS termination.
    pub private_key: Option<PathBuf>,

    /// Shared secret echoed back by the platform in every webhook call.
    pub secret_token: Option<String>,

    /// Drop updates queued while no webhook was registered.
    pub drop_pending_updates: bool,

    /// Maximum simultaneous webhook connections the platform may open.
    pub max_connections: u32,

    /// Update kinds the platform should deliver.
    pub allowed_updates: Vec<String>,

    /// Fixed IP the platform should use instead of resolving the webhook host.
    pub webhook_ip: Option<String>,

    /// Verbose logging.
    pub debug: bool,

    /// Bot API root URL.
    pub api_base: String,

    #[serde(default)]
    pub ngrok: NgrokSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            ngrok_token: None,
            webhook: None,
            endpoint: DEFAULT_WEBHOOK_PATH.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8443,
            certificate: None,
            private_key: None,
            secret_token: None,
            drop_pending_updates: true,
            max_connections: 40,
            allowed_updates: vec!["message".to_string()],
            webhook_ip: None,
            debug: false,
            api_base: DEFAULT_API_BASE.to_string(),
            ngrok: NgrokSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl fmt::Debug for RawSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSettings")
            .field("bot_token", &"<redacted>")
            .field("ngrok_token", &self.ngrok_token.as_ref().map(|_| "<redacted>"))
            .field("webhook", &self.webhook)
            .field("endpoint", &self.endpoint)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("certificate", &self.certificate)
            .field("private_key", &self.private_key)
            .field("secret_token", &self.secret_token.as_ref().map(|_| "<redacted>"))
            .field("drop_pending_updates", &self.drop_pending_updates)
            .field("max_connections", &self.max_connections)
            .field("allowed_updates", &self.allowed_updates)
            .field("webhook_ip", &self.webhook_ip)
            .field("debug", &self.debug)
            .field("api_base", &self.api_base)
            .field("ngrok", &self.ngrok)
            .field("server", &self.server)
            .finish()
    }
}

/// ngrok agent settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NgrokSettings {
    /// Path or name of the `ngrok` executable.
    pub binary: PathBuf,

    /// Optional ngrok agent config file.
    pub config: Option<PathBuf>,

    /// Optional ngrok region.
    pub region: Option<String>,

    /// How long to wait for the agent to report a public URL.
    pub startup_timeout_secs: u64,
}

impl Default for NgrokSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ngrok"),
            config: None,
            region: None,
            startup_timeout_secs: 10,
        }
    }
}

/// HTTP server tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,

    /// Bind address for the Prometheus exporter; disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_body_size: 1024 * 1024,
            metrics_address: None,
        }
    }
}

/// Where the public HTTPS endpoint comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum EndpointSource {
    /// A stable public URL operated outside this process.
    Preconfigured(Url),
    /// An ephemeral ngrok tunnel opened at startup.
    Tunnel { auth_token: String },
}

impl fmt::Debug for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSource::Preconfigured(url) => {
                f.debug_tuple("Preconfigured").field(&url.as_str()).finish()
            }
            EndpointSource::Tunnel { .. } => f
                .debug_struct("Tunnel")
                .field("auth_token", &"<redacted>")
                .finish(),
        }
    }
}

impl EndpointSource {
    pub fn uses_tunnel(&self) -> bool {
        matches!(self, EndpointSource::Tunnel { .. })
    }
}

/// Local listener address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindConfig {
    pub host: String,
    pub port: u16,
}

impl BindConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Certificate and key for local TLS termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// `setWebhook` delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub drop_pending_updates: bool,
    pub max_connections: u32,
    pub allowed_updates: Vec<String>,
    pub ip_address: Option<IpAddr>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            drop_pending_updates: true,
            max_connections: 40,
            allowed_updates: vec!["message".to_string()],
            ip_address: None,
        }
    }
}

/// Validated, immutable configuration.
#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub endpoint_source: EndpointSource,
    pub bind: BindConfig,
    pub webhook_path: String,
    /// Certificate uploaded on registration; already cleared for ngrok-hosted URLs.
    pub certificate: Option<PathBuf>,
    pub tls: Option<TlsConfig>,
    pub secret_token: Option<String>,
    pub delivery: DeliveryOptions,
    pub debug: bool,
    pub api_base: Url,
    pub ngrok: NgrokSettings,
    pub server: ServerSettings,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("endpoint_source", &self.endpoint_source)
            .field("bind", &self.bind)
            .field("webhook_path", &self.webhook_path)
            .field("certificate", &self.certificate)
            .field("tls", &self.tls)
            .field("secret_token", &self.secret_token.as_ref().map(|_| "<redacted>"))
            .field("delivery", &self.delivery)
            .field("debug", &self.debug)
            .field("api_base", &self.api_base.as_str())
            .field("ngrok", &self.ngrok)
            .field("server", &self.server)
            .finish()
    }
}

impl Config {
    /// Minimal configuration with a pre-configured public URL and defaults elsewhere.
    pub fn with_public_url(bot_token: impl Into<String>, public_url: Url) -> Self {
        Self::with_source(bot_token, EndpointSource::Preconfigured(public_url))
    }

    /// Minimal configuration that opens an ngrok tunnel at startup.
    pub fn with_tunnel(bot_token: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self::with_source(
            bot_token,
            EndpointSource::Tunnel {
                auth_token: auth_token.into(),
            },
        )
    }

    fn with_source(bot_token: impl Into<String>, endpoint_source: EndpointSource) -> Self {
        let defaults = RawSettings::default();
        Self {
            bot_token: bot_token.into(),
            endpoint_source,
            bind: BindConfig {
                host: defaults.host,
                port: defaults.port,
            },
            webhook_path: defaults.endpoint,
            certificate: None,
            tls: None,
            secret_token: None,
            delivery: DeliveryOptions::default(),
            debug: false,
            api_base: default_api_base(),
            ngrok: defaults.ngrok,
            server: defaults.server,
        }
    }

    pub fn uses_tunnel(&self) -> bool {
        self.endpoint_source.uses_tunnel()
    }
}

fn default_api_base() -> Url {
    Url::parse(DEFAULT_API_BASE).expect("DEFAULT_API_BASE is a valid URL")
}

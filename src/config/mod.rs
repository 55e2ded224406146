//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! relay.toml (optional)
//!     → loader.rs (parse & deserialize into RawSettings)
//!     → loader.rs (overlay BOT_TOKEN, WEBHOOK, NGROK_TOKEN, ... from the environment)
//!     → validation.rs (semantic checks, derived fields, warnings)
//!     → Config (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once built; there is no reload
//! - All raw fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BindConfig, Config, DeliveryOptions, EndpointSource, NgrokSettings, RawSettings,
    ServerSettings, TlsConfig,
};
pub use validation::{validate_settings, ConfigWarning, ValidatedConfig, ValidationError};

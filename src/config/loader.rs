//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::RawSettings;
use crate::config::validation::{validate_settings, ValidatedConfig, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load settings from an optional TOML file, overlay the process environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<ValidatedConfig, ConfigError> {
    let mut raw = match path {
        Some(path) => read_settings(path)?,
        None => RawSettings::default(),
    };
    apply_env_overrides(&mut raw, |key| std::env::var(key).ok())?;
    validate_settings(raw).map_err(ConfigError::Validation)
}

/// Parse a TOML settings file without validating it.
pub fn read_settings(path: &Path) -> Result<RawSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment variables onto `raw`. `lookup` abstracts `std::env::var`.
pub fn apply_env_overrides<F>(raw: &mut RawSettings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BOT_TOKEN") {
        raw.bot_token = v;
    }
    if let Some(v) = lookup("NGROK_TOKEN") {
        raw.ngrok_token = Some(v);
    }
    if let Some(v) = lookup("WEBHOOK") {
        raw.webhook = Some(v);
    }
    if let Some(v) = lookup("ENDPOINT") {
        raw.endpoint = v;
    }
    if let Some(v) = lookup("HOST") {
        raw.host = v;
    }
    if let Some(v) = lookup("PORT") {
        raw.port = parse_env("PORT", v)?;
    }
    if let Some(v) = lookup("CERTIFICATE") {
        raw.certificate = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("PRIVATE_KEY") {
        raw.private_key = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("SECRET_TOKEN") {
        raw.secret_token = Some(v);
    }
    if let Some(v) = lookup("DROP_PENDING_UPDATES") {
        raw.drop_pending_updates = parse_bool("DROP_PENDING_UPDATES", v)?;
    }
    if let Some(v) = lookup("MAX_CONNECTIONS") {
        raw.max_connections = parse_env("MAX_CONNECTIONS", v)?;
    }
    if let Some(v) = lookup("ALLOWED_UPDATES") {
        raw.allowed_updates = parse_list("ALLOWED_UPDATES", v)?;
    }
    if let Some(v) = lookup("WEBHOOK_IP") {
        raw.webhook_ip = Some(v);
    }
    if let Some(v) = lookup("DEBUG") {
        raw.debug = parse_bool("DEBUG", v)?;
    }
    if let Some(v) = lookup("API_BASE") {
        raw.api_base = v;
    }
    if let Some(v) = lookup("NGROK_BIN") {
        raw.ngrok.binary = PathBuf::from(v);
    }
    if let Some(v) = lookup("NGROK_CONFIG") {
        raw.ngrok.config = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("NGROK_REGION") {
        raw.ngrok.region = Some(v);
    }
    if let Some(v) = lookup("METRICS_ADDRESS") {
        raw.server.metrics_address = Some(v);
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env { var, value }),
    }
}

/// Accepts a JSON array (`["message","edited_message"]`) or a comma-separated list.
fn parse_list(var: &'static str, value: String) -> Result<Vec<String>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|_| ConfigError::Env { var, value });
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut raw = RawSettings::default();
        apply_env_overrides(
            &mut raw,
            env(&[
                ("BOT_TOKEN", "T"),
                ("WEBHOOK", "https://example.com"),
                ("PORT", "443"),
                ("DROP_PENDING_UPDATES", "false"),
                ("ALLOWED_UPDATES", r#"["message","callback_query"]"#),
                ("NGROK_REGION", "eu"),
            ]),
        )
        .unwrap();
        assert_eq!(raw.bot_token, "T");
        assert_eq!(raw.webhook.as_deref(), Some("https://example.com"));
        assert_eq!(raw.port, 443);
        assert!(!raw.drop_pending_updates);
        assert_eq!(raw.allowed_updates, vec!["message", "callback_query"]);
        assert_eq!(raw.ngrok.region.as_deref(), Some("eu"));
    }

    #[test]
    fn test_comma_separated_allowed_updates() {
        let mut raw = RawSettings::default();
        apply_env_overrides(&mut raw, env(&[("ALLOWED_UPDATES", "message, edited_message")]))
            .unwrap();
        assert_eq!(raw.allowed_updates, vec!["message", "edited_message"]);
    }

    #[test]
    fn test_bad_env_value() {
        let mut raw = RawSettings::default();
        let err = apply_env_overrides(&mut raw, env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "PORT", .. }));

        let err = apply_env_overrides(&mut raw, env(&[("DEBUG", "maybe")])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for DEBUG: 'maybe'");
    }

    #[test]
    fn test_read_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bot_token = \"T\"\nngrok_token = \"N\"\nport = 88").unwrap();
        let raw = read_settings(file.path()).unwrap();
        assert_eq!(raw.bot_token, "T");
        assert_eq!(raw.ngrok_token.as_deref(), Some("N"));
        assert_eq!(raw.port, 88);
    }

    #[test]
    fn test_missing_file() {
        let err = read_settings(Path::new("/no/such/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigError::Validation(vec![
            ValidationError::MissingBotToken,
            ValidationError::PortNotAllowed(8080),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("Validation failed: bot_token is required, port 8080"));
    }
}

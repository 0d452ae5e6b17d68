//! YAML configuration with defaults and environment overrides

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{DEFAULT_PLAYGROUND_URL, DEFAULT_SCOPE_ENDPOINT};
use crate::{Result, WizardError};

pub const ENV_PREFIX: &str = "GOOGLE_AUTH_WIZARD_";

const DEFAULT_CONFIG_FILE: &str = r#"# Google Auth Wizard Configuration
# This file contains the configuration settings for the Google Auth Wizard application

server:
  # Default port for the OAuth callback server
  defaultPort: 8080

  # Maximum number of ports to try if the default port is busy
  maxPortTries: 10

  # Timeout for the OAuth callback server (format: 5m, 300s, etc.)
  serverTimeout: 5m0s

oauth:
  # OAuth callback path
  callbackPath: /callback

  # Google OAuth playground URL for fetching scopes
  oauthPlaygroundURL: https://developers.google.com/oauthplayground

  # Endpoint for fetching scopes
  scopeEndpoint: getScopes

  # Timeout for scope fetching requests (format: 60s, 1m, etc.)
  scopeTimeout: 1m0s

terminal:
  # Terminal interface height (number of lines given to the list)
  height: 20
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// First port tried for the OAuth callback server
    pub default_port: u16,
    /// Number of consecutive ports tried
    pub max_port_tries: u16,
    /// How long to wait for the OAuth callback
    #[serde(with = "go_duration")]
    pub server_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_port: 8080,
            max_port_tries: 10,
            server_timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthSection {
    pub callback_path: String,
    #[serde(rename = "oauthPlaygroundURL")]
    pub oauth_playground_url: String,
    pub scope_endpoint: String,
    #[serde(with = "go_duration")]
    pub scope_timeout: Duration,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            callback_path: "/callback".to_string(),
            oauth_playground_url: DEFAULT_PLAYGROUND_URL.to_string(),
            scope_endpoint: DEFAULT_SCOPE_ENDPOINT.to_string(),
            scope_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub height: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { height: 20 }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthSection,
    pub terminal: TerminalConfig,
}

impl Config {
    /// Parse a YAML configuration document
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| WizardError::Config(format!("error parsing config file: {e}")))
    }

    /// Read and parse a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            WizardError::Config(format!("error reading config file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Load configuration, falling back to defaults on any problem
    ///
    /// A missing file is created with the commented defaults. Environment
    /// overrides are applied last.
    pub fn load_with_defaults(path: impl AsRef<Path>) -> Self {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load_with_defaults`] with an explicit environment lookup
    pub fn load_with_env(path: impl AsRef<Path>, env: impl Fn(&str) -> Option<String>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                "Config file '{}' not found, creating default configuration...",
                path.display()
            );
            if let Err(e) = Self::write_default_file(path) {
                warn!("Could not create config file ({e}), using in-memory defaults");
                let mut config = Self::default();
                config.apply_overrides(env);
                return config;
            }
            info!("Default config file created at '{}'", path.display());
        }

        let mut config = Self::load(path).unwrap_or_else(|e| {
            warn!("Could not load config file ({e}), using defaults");
            Self::default()
        });
        config.apply_overrides(env);
        config
    }

    /// Write the commented default configuration to `path`
    pub fn write_default_file(path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, DEFAULT_CONFIG_FILE)
            .map_err(|e| WizardError::Config(format!("error writing config file: {e}")))
    }

    /// Apply `GOOGLE_AUTH_WIZARD_*` overrides; invalid values are ignored
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| {
            env(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.is_empty())
        };

        if let Some(port) = var("PORT").and_then(|v| v.parse::<u16>().ok()).filter(|p| *p > 0) {
            self.server.default_port = port;
        }
        if let Some(tries) = var("MAX_PORT_TRIES")
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|t| *t > 0)
        {
            self.server.max_port_tries = tries;
        }
        if let Some(timeout) = var("SERVER_TIMEOUT").and_then(|v| parse_duration(&v)) {
            self.server.server_timeout = timeout;
        }
        if let Some(path) = var("CALLBACK_PATH").filter(|p| p.starts_with('/')) {
            self.oauth.callback_path = path;
        }
        if let Some(url) = var("PLAYGROUND_URL").filter(|u| u.starts_with("http")) {
            self.oauth.oauth_playground_url = url;
        }
        if let Some(endpoint) = var("SCOPE_ENDPOINT") {
            self.oauth.scope_endpoint = endpoint;
        }
        if let Some(timeout) = var("SCOPE_TIMEOUT").and_then(|v| parse_duration(&v)) {
            self.oauth.scope_timeout = timeout;
        }
        if let Some(height) = var("TERMINAL_HEIGHT")
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|h| *h > 0)
        {
            self.terminal.height = height;
        }

        debug!("Configuration after environment overrides: {:?}", self);
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.server.default_port == 0 {
            return Err(WizardError::Config(
                "invalid default port: 0 (must be between 1 and 65535)".to_string(),
            ));
        }
        if self.server.max_port_tries == 0 {
            return Err(WizardError::Config(
                "invalid maxPortTries: 0 (must be greater than 0)".to_string(),
            ));
        }
        if self.server.server_timeout.is_zero() {
            return Err(WizardError::Config(
                "invalid serverTimeout: must be greater than 0".to_string(),
            ));
        }
        if self.oauth.scope_timeout.is_zero() {
            return Err(WizardError::Config(
                "invalid scopeTimeout: must be greater than 0".to_string(),
            ));
        }
        if self.oauth.callback_path.is_empty() {
            return Err(WizardError::Config("callbackPath cannot be empty".to_string()));
        }
        if self.oauth.oauth_playground_url.is_empty() {
            return Err(WizardError::Config(
                "oauthPlaygroundURL cannot be empty".to_string(),
            ));
        }
        if self.oauth.scope_endpoint.is_empty() {
            return Err(WizardError::Config("scopeEndpoint cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Parse a Go-style duration such as `5m0s`, `300s`, `1h30m` or `100ms`
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text == "0" {
        return Some(Duration::ZERO);
    }
    if text.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        let part = Duration::try_from_secs_f64(value * seconds_per_unit).ok()?;
        total = total.checked_add(part)?;
    }
    Some(total)
}

/// Format a duration the way Go prints it (`5m0s`, `1h0m0s`, `30s`, `100ms`)
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        let millis = duration.subsec_millis();
        return if millis == 0 {
            "0s".to_string()
        } else {
            format!("{millis}ms")
        };
    }

    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

mod go_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid duration: {text}")))
    }
}

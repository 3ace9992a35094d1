use crate::error::{LogsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Provider keys used to reach a device's channels
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    /// Subscribe-side key (needed for subscribe and history)
    pub subscribe_key: String,

    /// Publish-side key (needed for clear)
    pub publish_key: String,
}

impl Credentials {
    pub fn new(subscribe_key: impl Into<String>, publish_key: impl Into<String>) -> Self {
        Self {
            subscribe_key: subscribe_key.into(),
            publish_key: publish_key.into(),
        }
    }
}

/// Client configuration with everything needed to talk to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Provider keys
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Provider host (without scheme)
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Whether to use https
    #[serde(default = "default_ssl")]
    pub ssl: bool,

    /// Client identifier reported to the provider (random when absent)
    #[serde(default)]
    pub uuid: Option<String>,

    /// Timeout for history, publish and time requests (in seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a single subscribe long-poll (in seconds)
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout_secs: u64,

    /// Delay before the subscribe loop retries after a network failure (in milliseconds)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

// Default value functions for serde
fn default_origin() -> String {
    "ps.pndsn.com".to_string()
}

fn default_ssl() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

fn default_subscribe_timeout() -> u64 {
    310
}

fn default_reconnect_delay() -> u64 {
    1000
}

impl ClientConfig {
    /// Build a configuration with default settings for the given keys
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            origin: default_origin(),
            ssl: default_ssl(),
            uuid: None,
            request_timeout_secs: default_request_timeout(),
            subscribe_timeout_secs: default_subscribe_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }

    /// Load a client configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<ClientConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LogsError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(LogsError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<ClientConfig> {
        toml::from_str(contents)
            .map_err(|e| LogsError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<ClientConfig> {
        serde_json::from_str(contents)
            .map_err(|e| LogsError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.credentials.subscribe_key.is_empty() {
            return Err(LogsError::MissingConfigField("subscribe_key".to_string()));
        }

        if self.credentials.publish_key.is_empty() {
            return Err(LogsError::MissingConfigField("publish_key".to_string()));
        }

        if self.origin.is_empty() {
            return Err(LogsError::MissingConfigField("origin".to_string()));
        }

        if self.origin.contains("://") {
            return Err(LogsError::ConfigValidationError(format!(
                "origin must not include a scheme: {}",
                self.origin
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(LogsError::ConfigValidationError(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.subscribe_timeout_secs == 0 {
            return Err(LogsError::ConfigValidationError(
                "subscribe_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Expand environment variables in keys, origin and uuid
    fn expand_env_vars(&mut self) {
        self.credentials.subscribe_key = expand_env_in_string(&self.credentials.subscribe_key);
        self.credentials.publish_key = expand_env_in_string(&self.credentials.publish_key);
        self.origin = expand_env_in_string(&self.origin);
        self.uuid = self.uuid.as_deref().map(expand_env_in_string);
    }

    /// Base URL of the provider, e.g. `https://ps.pndsn.com`
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.origin)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Expand `$VAR` and `${VAR}` references in a string
fn expand_env_in_string(s: &str) -> String {
    let mut result = s.to_string();

    for (key, value) in std::env::vars() {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default API endpoint of the appliance.
pub const DEFAULT_API_URL: &str = "https://localhost/api/v2.0";

/// Default interval between status polls, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Transport used to reach the appliance API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportKind {
    /// Native HTTP client.
    Http,
    /// External `curl` process per request.
    Curl,
}

/// Connection settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "TRUEVIRT",
    discovery(
        app_name = "truevirt",
        env_var = "TRUEVIRT_CONFIG_PATH",
        config_file_name = "truevirt.toml",
        dotfile_name = ".truevirt.toml",
        project_file_name = "truevirt.toml"
    )
)]
pub struct ApiConfig {
    /// Base URL of the appliance API, including the version prefix.
    #[ortho_config(default = DEFAULT_API_URL.to_owned())]
    pub api_url: String,
    /// API key sent as a bearer token. This value is required.
    pub api_key: Option<String>,
    /// Transport name: `http` or `curl`.
    #[ortho_config(default = "http".to_owned())]
    pub transport: String,
    /// Path to the `curl` executable used by the `curl` transport.
    #[ortho_config(default = "curl".to_owned())]
    pub curl_bin: String,
    /// Whether to accept the appliance's self-signed certificate.
    #[ortho_config(default = true)]
    pub accept_invalid_certs: bool,
    /// Seconds between status polls while waiting for an instance.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
}

impl ApiConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("truevirt")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the API key or URL is empty
    /// and [`ConfigError::InvalidTransport`] for an unknown transport name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            self.api_key.as_deref().unwrap_or_default(),
            "API key",
            "TRUEVIRT_API_KEY",
            "api_key",
        )?;
        require_field(&self.api_url, "API URL", "TRUEVIRT_API_URL", "api_url")?;
        if self.transport_kind()? == TransportKind::Curl {
            require_field(&self.curl_bin, "curl binary", "TRUEVIRT_CURL_BIN", "curl_bin")?;
        }
        Ok(())
    }

    /// Returns the validated API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no key is configured.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        let key = self.api_key.as_deref().unwrap_or_default();
        require_field(key, "API key", "TRUEVIRT_API_KEY", "api_key")?;
        Ok(key.trim())
    }

    /// Parses the configured transport name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTransport`] for names other than `http`
    /// and `curl`.
    pub fn transport_kind(&self) -> Result<TransportKind, ConfigError> {
        match self.transport.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "curl" => Ok(TransportKind::Curl),
            _ => Err(ConfigError::InvalidTransport(self.transport.clone())),
        }
    }

    /// Interval between status polls. Zero is clamped to one second.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            api_key: None,
            transport: String::from("http"),
            curl_bin: String::from("curl"),
            accept_invalid_certs: true,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn require_field(
    value: &str,
    description: &str,
    env_var: &str,
    toml_key: &str,
) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {description}: set {env_var} or add {toml_key} to truevirt.toml"
        )));
    }
    Ok(())
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Raised when the transport name is not recognised.
    #[error("unknown transport '{0}': expected 'http' or 'curl'")]
    InvalidTransport(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

//! Client configuration

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default API root of a local backend
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Connection settings for [`crate::ApiClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `https://portal.example.com/api/v1`
    pub base_url: String,

    /// Request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: concat!("veridia-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file, with `VERIDIA_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let settings = Self::builder_with_defaults()?
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("VERIDIA"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed
    pub fn from_env() -> Result<Self, ClientError> {
        let settings = Self::builder_with_defaults()?
            .add_source(config::Environment::with_prefix("VERIDIA"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn builder_with_defaults()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, ClientError> {
        let defaults = Self::default();
        Ok(config::Config::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("user_agent", defaults.user_agent)?)
    }

    /// Check that the base URL is an absolute http(s) URL
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ClientError::Configuration(format!(
                "unsupported base_url scheme '{other}'"
            ))),
        }
    }
}

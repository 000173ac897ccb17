//! CLI configuration utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use veridia_client::ClientConfig;

/// Data directory: explicit flag (or `VERIDIA_STATE_DIR`), else the system data dir
pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("veridia")
    })
}

/// Load client settings from a file or the environment, then apply the
/// `--base-url` override
pub fn load_client_config(path: Option<&Path>, base_url: Option<String>) -> Result<ClientConfig> {
    let mut config = match path {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ClientConfig::from_env().context("loading configuration from environment")?,
    };

    if let Some(base_url) = base_url {
        config.base_url = base_url;
        config.validate()?;
    }

    Ok(config)
}

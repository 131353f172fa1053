//! Configuration file loading.
//!
//! The configuration file is read once per startup attempt. Command-line
//! overrides are applied afterwards by [`super::resolve`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::{Config, ProxyConfig};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Loads and validates the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this loader reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, parse and validate the configuration file.
    ///
    /// Either the whole configuration is returned or an error; there are no
    /// partial results.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|e| ConfigError::ReadError {
            path: self.path.clone(),
            source: e,
        })?;

        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: self.path.clone(),
                source: e,
            })?;

        config.validate()?;

        debug!(
            "Loaded config from {:?}: socks5={}, http={}, {} egress pool(s)",
            self.path,
            config.socks5_address,
            config.http_address,
            config.egress_pools.len()
        );

        Ok(config)
    }

    /// Load only the listen addresses.
    pub fn load_proxy_config(&self) -> Result<ProxyConfig, ConfigError> {
        self.load().map(|config| config.proxy_config())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

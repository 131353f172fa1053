//! Configuration schema definitions.
//!
//! The configuration file is JSON. Only the keys below are read; anything else
//! in the file is ignored so the same file can carry settings for other
//! subsystems.
//!
//! ```json
//! {
//!   "socks5_address": "127.0.0.1:1080",
//!   "http_address": "127.0.0.1:8080",
//!   "egress_pools": [
//!     { "name": "primary", "addresses": ["192.0.2.10", "2001:db8::10"] }
//!   ]
//! }
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::net::IpAddr;

use super::error::ConfigError;

/// Top-level configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Listen address of the SOCKS5 accept loop.
    pub socks5_address: String,

    /// Listen address of the HTTP accept loop.
    pub http_address: String,

    /// Outbound address pools used as source addresses when dialing.
    #[serde(default)]
    pub egress_pools: Vec<EgressPoolConfig>,
}

/// One named pool of local source addresses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EgressPoolConfig {
    /// Pool name, used in logs.
    pub name: String,

    /// Local IP addresses outbound sockets are bound to.
    pub addresses: Vec<String>,
}

impl EgressPoolConfig {
    /// Parse the configured addresses.
    pub fn parsed_addresses(&self) -> Result<Vec<IpAddr>, ConfigError> {
        self.addresses
            .iter()
            .map(|s| {
                s.trim().parse::<IpAddr>().map_err(|_| {
                    ConfigError::invalid(
                        format!("egress_pools.{}.addresses", self.name),
                        format!("'{}' is not an IP address", s),
                    )
                })
            })
            .collect()
    }
}

/// The pair of listen addresses handed to the accept loops.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyConfig {
    /// SOCKS5 listen address.
    pub socks5_addr: String,
    /// HTTP listen address.
    pub http_addr: String,
}

impl ProxyConfig {
    /// Create a new address pair.
    pub fn new(socks5_addr: impl Into<String>, http_addr: impl Into<String>) -> Self {
        Self {
            socks5_addr: socks5_addr.into(),
            http_addr: http_addr.into(),
        }
    }

    /// Check that both addresses are present.
    ///
    /// Syntax is not checked here; the accept loops report bind failures.
    pub fn ensure_complete(&self) -> Result<(), ConfigError> {
        if self.socks5_addr.trim().is_empty() {
            return Err(ConfigError::invalid(
                "socks5_address",
                "empty and no -b override given",
            ));
        }
        if self.http_addr.trim().is_empty() {
            return Err(ConfigError::invalid(
                "http_address",
                "empty and no -hb override given",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// The listen addresses as read from the file.
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig::new(self.socks5_address.clone(), self.http_address.clone())
    }

    /// Validate the egress pool definitions.
    ///
    /// Listen addresses may be empty here; they can still be supplied from the
    /// command line and are checked after overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (idx, pool) in self.egress_pools.iter().enumerate() {
            if pool.name.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("egress_pools[{}].name", idx),
                    "must not be empty",
                ));
            }
            if !seen.insert(pool.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("egress_pools[{}].name", idx),
                    format!("duplicate pool name '{}'", pool.name),
                ));
            }
            if pool.addresses.is_empty() {
                return Err(ConfigError::invalid(
                    format!("egress_pools.{}.addresses", pool.name),
                    "at least one address is required",
                ));
            }
            pool.parsed_addresses()?;
        }
        Ok(())
    }
}

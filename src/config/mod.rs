//! Configuration system for duoproxy.
//!
//! Listen addresses come from two layers, applied in order:
//!
//! 1. The JSON configuration file (`-c`, default `config.json`)
//! 2. Command-line overrides (`-b` for SOCKS5, `-hb` for HTTP)
//!
//! An override wins when it is a non-empty string; each address is resolved
//! independently. The configuration file also defines the egress pools.

mod error;
mod loader;
mod overrides;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use overrides::{resolve, AddressOverride};
pub use schema::{Config, EgressPoolConfig, ProxyConfig};

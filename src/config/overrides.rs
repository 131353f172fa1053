//! Command-line address overrides.

use super::schema::ProxyConfig;

/// Listen addresses supplied on the command line.
///
/// `None` and an empty string both mean "keep the configured address".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressOverride {
    /// Replacement for the SOCKS5 listen address (`-b`).
    pub socks5: Option<String>,
    /// Replacement for the HTTP listen address (`-hb`).
    pub http: Option<String>,
}

impl AddressOverride {
    /// Create an override pair.
    pub fn new(socks5: Option<String>, http: Option<String>) -> Self {
        Self { socks5, http }
    }

    /// Apply these overrides to `base`. See [`resolve`].
    pub fn apply(&self, base: &ProxyConfig) -> ProxyConfig {
        resolve(base, self)
    }
}

/// Apply command-line overrides over the configured addresses.
///
/// Each field is handled independently: a non-empty override replaces the base
/// value, anything else keeps it. Address syntax is not checked.
pub fn resolve(base: &ProxyConfig, overrides: &AddressOverride) -> ProxyConfig {
    ProxyConfig {
        socks5_addr: pick(&base.socks5_addr, overrides.socks5.as_deref()),
        http_addr: pick(&base.http_addr, overrides.http.as_deref()),
    }
}

fn pick(base: &str, replacement: Option<&str>) -> String {
    match replacement {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => base.to_string(),
    }
}

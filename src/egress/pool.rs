//! Egress pools: named sets of local source addresses.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

use super::error::EgressPoolCloseError;
use crate::config::{ConfigError, EgressPoolConfig};

/// An outbound network identity that must be released at shutdown.
///
/// Once registered with an [`EgressPoolRegistry`](super::EgressPoolRegistry),
/// only the registry calls [`close`](EgressPool::close).
pub trait EgressPool: Send + Sync {
    /// Pool name, used in logs.
    fn name(&self) -> &str;

    /// Release the pool.
    fn close(&self) -> Result<(), EgressPoolCloseError>;
}

/// A pool of local IP addresses outbound sockets are bound to.
///
/// Addresses are handed out round-robin among those matching the target's
/// address family. A closed pool hands out nothing.
pub struct LocalAddressPool {
    name: String,
    addresses: Vec<IpAddr>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl LocalAddressPool {
    /// Create a pool from a name and its addresses.
    pub fn new(name: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            addresses,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Build a pool from its configuration entry.
    pub fn from_config(config: &EgressPoolConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.name.clone(), config.parsed_addresses()?))
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Next source address for a target of the given family.
    pub fn pick(&self, want_ipv6: bool) -> Option<IpAddr> {
        if self.is_closed() {
            return None;
        }

        let candidates: Vec<IpAddr> = self
            .addresses
            .iter()
            .copied()
            .filter(|ip| ip.is_ipv6() == want_ipv6)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx])
    }
}

impl EgressPool for LocalAddressPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) -> Result<(), EgressPoolCloseError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(EgressPoolCloseError::AlreadyClosed {
                pool: self.name.clone(),
            });
        }
        debug!("Closed egress pool '{}'", self.name);
        Ok(())
    }
}

impl fmt::Debug for LocalAddressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAddressPool")
            .field("name", &self.name)
            .field("addresses", &self.addresses)
            .field("closed", &self.is_closed())
            .finish()
    }
}

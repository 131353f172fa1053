//! Outbound dialing through the egress pools.
//!
//! Accept loops hold a [`Dialer`] rather than the pools themselves, so they can
//! pick source addresses but never release a pool.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use super::pool::LocalAddressPool;

/// Dials destinations, binding outbound sockets to pool addresses.
#[derive(Clone, Default)]
pub struct Dialer {
    pools: Arc<Vec<Arc<LocalAddressPool>>>,
    next_pool: Arc<AtomicUsize>,
}

impl Dialer {
    /// Dialer that selects source addresses from `pools`.
    pub fn new(pools: Vec<Arc<LocalAddressPool>>) -> Self {
        Self {
            pools: Arc::new(pools),
            next_pool: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Dialer that always lets the OS choose the source address.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Pick a source address for `target` from the next open pool with an
    /// address of the right family.
    pub fn select_source(&self, target: &SocketAddr) -> Option<IpAddr> {
        let count = self.pools.len();
        if count == 0 {
            return None;
        }

        let start = self.next_pool.fetch_add(1, Ordering::Relaxed);
        (0..count)
            .map(|offset| &self.pools[(start + offset) % count])
            .find_map(|pool| pool.pick(target.is_ipv6()))
    }

    /// Resolve `host` and connect to the first address that accepts.
    pub async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;

        for target in tokio::net::lookup_host((host, port)).await? {
            match self.connect_addr(target).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {} failed: {}", target, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("could not resolve {}", host),
            )
        }))
    }

    /// Connect to a resolved address.
    pub async fn connect_addr(&self, target: SocketAddr) -> io::Result<TcpStream> {
        let socket = if target.is_ipv6() {
            TcpSocket::new_v6()?
        } else {
            TcpSocket::new_v4()?
        };

        if let Some(source) = self.select_source(&target) {
            socket.bind(SocketAddr::new(source, 0))?;
            debug!(bind = %source, target = %target, "Bound outgoing socket");
        }

        socket.connect(target).await
    }
}

//! Concurrent startup of the two accept loops.
//!
//! The SOCKS5 loop runs on its own task and the HTTP loop on the caller's
//! task. Once the HTTP loop returns, the coordinator waits for the SOCKS5 task
//! to end before returning, so anything released after `run` observes both
//! services stopped.
//!
//! ```text
//!   caller task                       spawned task
//!   ───────────                       ────────────
//!   spawn(socks5) ──────────────────► socks5.serve(addr)
//!   http.serve(addr)                      │
//!       │ (blocks)                        │ (blocks)
//!       ▼                                 ▼
//!   waiter.wait() ◄──────────────── notifier dropped
//! ```

use std::future::Future;

use tracing::{error, info};

use super::error::ProxyError;
use super::signal::shutdown_signal;
use crate::config::ProxyConfig;

/// A protocol accept loop.
///
/// `serve` binds `addr` and handles connections until the listener fails.
/// Under normal operation it never returns.
pub trait AcceptLoop: Send + 'static {
    /// Protocol name, used in logs.
    fn name(&self) -> &'static str;

    /// Bind `addr` and run the accept loop.
    fn serve(self, addr: String) -> impl Future<Output = Result<(), ProxyError>> + Send + 'static;
}

/// Runs the SOCKS5 and HTTP accept loops side by side.
#[derive(Debug, Clone)]
pub struct ListenerCoordinator {
    addrs: ProxyConfig,
}

impl ListenerCoordinator {
    /// Coordinator for the given listen addresses.
    pub fn new(addrs: ProxyConfig) -> Self {
        Self { addrs }
    }

    /// Start both loops and block until both have ended.
    ///
    /// Loop failures are logged, never retried. The HTTP loop's error, if
    /// any, is returned once the SOCKS5 loop has also ended.
    pub async fn run<S, H>(&self, socks5: S, http: H) -> Result<(), ProxyError>
    where
        S: AcceptLoop,
        H: AcceptLoop,
    {
        let (notifier, waiter) = shutdown_signal();

        let socks5_name = socks5.name();
        let socks5_addr = self.addrs.socks5_addr.clone();
        info!("Starting {} listener on {}", socks5_name, socks5_addr);
        tokio::spawn(async move {
            // Dropping the notifier on any exit path, panics included, fires it.
            let _notifier = notifier;
            match socks5.serve(socks5_addr).await {
                Ok(()) => info!("{} listener stopped", socks5_name),
                Err(e) => error!("{} listener failed: {}", socks5_name, e),
            }
        });

        let http_name = http.name();
        info!("Starting {} listener on {}", http_name, self.addrs.http_addr);
        let http_result = http.serve(self.addrs.http_addr.clone()).await;
        match &http_result {
            Ok(()) => info!("{} listener stopped", http_name),
            Err(e) => error!("{} listener failed: {}", http_name, e),
        }

        waiter.wait().await;
        http_result
    }
}

//! Proxy startup and lifecycle.
//!
//! Both front-ends end up here. Startup runs in two phases:
//!
//! 1. [`prepare`]: load the configuration, apply address overrides, open the
//!    egress pools and register them. Any failure aborts before a listener
//!    exists.
//!    The release guard is armed as soon as the pools are registered, so a
//!    prepared proxy that is dropped without running still releases them.
//! 2. [`PreparedProxy::run`]: build the runtime, run both accept loops until they end, Ctrl-C arrives, or the front-end
//!    requests a stop. The runtime is shut down before the pools are released.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{AddressOverride, ConfigError, ConfigLoader, ProxyConfig, resolve};
use crate::egress::{Dialer, EgressPoolRegistry, LocalAddressPool, ReleaseGuard};
use crate::proxy::{AcceptLoop, HttpProxyServer, ListenerCoordinator, Socks5Server};

/// Grace period for in-flight tasks once the proxy stops.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration could not be loaded or is incomplete.
    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    /// The async runtime could not be created.
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Why a running proxy stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Both accept loops ended on their own.
    ListenersEnded,
    /// Ctrl-C was received.
    Interrupted,
    /// The front-end asked the proxy to stop.
    StopRequested,
}

/// A proxy whose configuration is loaded and whose pools are open.
///
/// Dropping it releases the pools.
pub struct PreparedProxy {
    addrs: ProxyConfig,
    registry: Arc<EgressPoolRegistry>,
    dialer: Dialer,
    release: ReleaseGuard,
}

/// Load configuration, resolve listen addresses and open egress pools.
pub fn prepare(config_path: &Path, overrides: &AddressOverride) -> Result<PreparedProxy, StartupError> {
    let config = ConfigLoader::new(config_path).load()?;

    let addrs = resolve(&config.proxy_config(), overrides);
    addrs.ensure_complete()?;

    let mut pools = Vec::with_capacity(config.egress_pools.len());
    for pool_config in &config.egress_pools {
        pools.push(Arc::new(LocalAddressPool::from_config(pool_config)?));
    }

    // Registered only after every pool parsed, so a bad config leaves nothing open.
    let registry = Arc::new(EgressPoolRegistry::new());
    for pool in &pools {
        registry.register(pool.clone());
    }
    let release = registry.release_guard();

    info!(
        "Resolved listen addresses: SOCKS5 {}, HTTP {} ({} egress pool(s))",
        addrs.socks5_addr,
        addrs.http_addr,
        pools.len()
    );

    Ok(PreparedProxy {
        addrs,
        registry,
        dialer: Dialer::new(pools),
        release,
    })
}

impl PreparedProxy {
    /// Final listen addresses.
    pub fn addrs(&self) -> &ProxyConfig {
        &self.addrs
    }

    /// Registry holding the open pools.
    pub fn registry(&self) -> &Arc<EgressPoolRegistry> {
        &self.registry
    }

    /// Run the SOCKS5 and HTTP servers until they end or a stop arrives.
    pub fn run(self, stop: watch::Receiver<bool>) -> Result<StopReason, StartupError> {
        let socks5 = Socks5Server::new(self.dialer.clone());
        let http = HttpProxyServer::new(self.dialer.clone());
        self.run_with(socks5, http, stop)
    }

    /// Run the given accept loops under the same lifecycle as [`run`](Self::run).
    pub fn run_with<S, H>(
        self,
        socks5: S,
        http: H,
        stop: watch::Receiver<bool>,
    ) -> Result<StopReason, StartupError>
    where
        S: AcceptLoop,
        H: AcceptLoop,
    {
        // Bound before the runtime so it is dropped after it.
        let Self { addrs, release: _release, .. } = self;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(StartupError::Runtime)?;

        let coordinator = ListenerCoordinator::new(addrs);
        let reason = runtime.block_on(async {
            tokio::select! {
                _ = coordinator.run(socks5, http) => StopReason::ListenersEnded,
                _ = interrupted() => StopReason::Interrupted,
                _ = stop_requested(stop) => StopReason::StopRequested,
            }
        });

        match reason {
            StopReason::ListenersEnded => info!("Proxy listeners have stopped"),
            StopReason::Interrupted => info!("Interrupted, shutting down"),
            StopReason::StopRequested => info!("Stop requested, shutting down"),
        }

        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
        Ok(reason)
    }
}

/// Prepare and run the proxy; the single entry point used by every front-end.
pub fn start_proxy(
    config_path: &Path,
    overrides: &AddressOverride,
    stop: watch::Receiver<bool>,
) -> Result<StopReason, StartupError> {
    prepare(config_path, overrides)?.run(stop)
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Resolves once `stop` is set. A dropped sender means no stop will come.
async fn stop_requested(mut stop: watch::Receiver<bool>) {
    if stop.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyError;
    use std::future::Future;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Immediate;

    impl AcceptLoop for Immediate {
        fn name(&self) -> &'static str {
            "immediate"
        }

        fn serve(self, _addr: String) -> impl Future<Output = Result<(), ProxyError>> + Send + 'static {
            async { Ok(()) }
        }
    }

    struct Forever;

    impl AcceptLoop for Forever {
        fn name(&self) -> &'static str {
            "forever"
        }

        fn serve(self, _addr: String) -> impl Future<Output = Result<(), ProxyError>> + Send + 'static {
            std::future::pending()
        }
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const WITH_POOLS: &str = r#"{
        "socks5_address": "127.0.0.1:1080",
        "http_address": "127.0.0.1:8080",
        "egress_pools": [
            {"name": "primary", "addresses": ["127.0.0.1"]},
            {"name": "secondary", "addresses": ["127.0.0.1"]}
        ]
    }"#;

    #[test]
    fn test_prepare_registers_pools() {
        let file = write_config(WITH_POOLS);
        let prepared = prepare(file.path(), &AddressOverride::default()).unwrap();

        assert_eq!(prepared.registry().len(), 2);
        assert_eq!(prepared.addrs().socks5_addr, "127.0.0.1:1080");
    }

    #[test]
    fn test_prepare_rejects_missing_file() {
        let result = prepare(Path::new("/nonexistent/duoproxy.json"), &AddressOverride::default());
        let err = result.err().unwrap();
        assert!(matches!(err, StartupError::Config(ConfigError::ReadError { .. })));
        assert!(err.to_string().starts_with("Failed to load config:"));
    }

    #[test]
    fn test_prepare_requires_addresses() {
        let file = write_config(r#"{"socks5_address": "", "http_address": "127.0.0.1:8080"}"#);
        assert!(prepare(file.path(), &AddressOverride::default()).is_err());

        let overrides = AddressOverride::new(Some("127.0.0.1:1090".into()), None);
        let prepared = prepare(file.path(), &overrides).unwrap();
        assert_eq!(prepared.addrs().socks5_addr, "127.0.0.1:1090");
    }

    #[test]
    fn test_dropping_prepared_proxy_releases_pools() {
        let file = write_config(WITH_POOLS);
        let prepared = prepare(file.path(), &AddressOverride::default()).unwrap();
        let registry = prepared.registry().clone();
        assert_eq!(registry.len(), 2);

        drop(prepared);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_run_releases_pools_when_listeners_end() {
        let file = write_config(WITH_POOLS);
        let prepared = prepare(file.path(), &AddressOverride::default()).unwrap();
        let registry = prepared.registry().clone();

        let (_stop_tx, stop_rx) = watch::channel(false);
        let reason = prepared.run_with(Immediate, Immediate, stop_rx).unwrap();

        assert_eq!(reason, StopReason::ListenersEnded);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_request_ends_run_and_releases_pools() {
        let file = write_config(WITH_POOLS);
        let prepared = prepare(file.path(), &AddressOverride::default()).unwrap();
        let registry = prepared.registry().clone();

        let (stop_tx, stop_rx) = watch::channel(false);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop_tx.send(true).unwrap();
        });

        let reason = prepared.run_with(Forever, Forever, stop_rx).unwrap();
        stopper.join().unwrap();

        assert_eq!(reason, StopReason::StopRequested);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_already_requested() {
        let file = write_config(WITH_POOLS);
        let prepared = prepare(file.path(), &AddressOverride::default()).unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        let reason = prepared.run_with(Forever, Forever, stop_rx).unwrap();
        assert_eq!(reason, StopReason::StopRequested);
    }
}

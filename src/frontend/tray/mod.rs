//! Tray-style front-end.
//!
//! The shell owns the user interface and decides when the proxy starts by
//! invoking the [`StartCallback`] it is handed. When the shell returns, the
//! front-end asks the proxy to stop and waits a bounded time for it to
//! release its egress pools.

mod panel;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{Frontend, FrontendError, FrontendKind};
use crate::config::{AddressOverride, ConfigLoader, ProxyConfig, resolve};
use crate::logging::LogBuffer;
use crate::orchestrator::{self, StartupError, StopReason};

pub use panel::PanelShell;

/// How long to wait for the proxy after the shell has returned.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Starts the proxy; blocks the calling thread until the proxy stops.
pub type StartCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs the proxy until it stops; [`orchestrator::start_proxy`] outside tests.
type Launcher = fn(&Path, &AddressOverride, watch::Receiver<bool>) -> Result<StopReason, StartupError>;

/// Errors raised by a tray shell.
#[derive(Debug, Error)]
pub enum TrayError {
    /// Terminal setup, drawing or input failed.
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Listen addresses shown by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayDisplay {
    /// SOCKS5 listen address.
    pub socks5_addr: String,
    /// HTTP listen address.
    pub http_addr: String,
}

impl From<ProxyConfig> for TrayDisplay {
    fn from(addrs: ProxyConfig) -> Self {
        Self {
            socks5_addr: addrs.socks5_addr,
            http_addr: addrs.http_addr,
        }
    }
}

/// User interface hosting the proxy.
pub trait TrayShell {
    /// Buffer the shell displays log output from.
    fn log_capture(&self) -> Option<LogBuffer> {
        None
    }

    /// Run the interface until the user quits. `start` may be invoked at
    /// most once, on any thread.
    fn run(&mut self, display: TrayDisplay, start: StartCallback) -> Result<(), TrayError>;
}

/// Front-end that hands the proxy to a [`TrayShell`].
pub struct TrayFrontend<S> {
    shell: S,
    stop_grace: Duration,
    launcher: Launcher,
}

impl<S: TrayShell> TrayFrontend<S> {
    /// Front-end driving `shell`.
    pub fn new(shell: S) -> Self {
        Self {
            shell,
            stop_grace: DEFAULT_STOP_GRACE,
            launcher: orchestrator::start_proxy,
        }
    }

    /// Override how long to wait for the proxy to stop.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// The wrapped shell.
    pub fn shell(&self) -> &S {
        &self.shell
    }

    #[cfg(test)]
    fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }
}

impl<S: TrayShell> Frontend for TrayFrontend<S> {
    fn kind(&self) -> FrontendKind {
        FrontendKind::Tray
    }

    fn log_capture(&self) -> Option<LogBuffer> {
        self.shell.log_capture()
    }

    fn start_proxy(&mut self, config_path: &Path, overrides: &AddressOverride) -> Result<(), FrontendError> {
        let base = ConfigLoader::new(config_path)
            .load_proxy_config()
            .map_err(StartupError::from)?;
        let display = TrayDisplay::from(resolve(&base, overrides));

        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::channel::<Result<StopReason, StartupError>>();

        let started = Arc::new(AtomicBool::new(false));
        let launcher = self.launcher;
        let config_path = config_path.to_path_buf();
        let overrides = overrides.clone();
        let start_flag = Arc::clone(&started);
        let start: StartCallback = Box::new(move || {
            start_flag.store(true, Ordering::SeqCst);
            let result = launcher(&config_path, &overrides, stop_rx);
            if let Err(e) = &result {
                error!("Proxy failed: {}", e);
            }
            let _ = done_tx.send(result);
        });

        let shell_result = self.shell.run(display, start);

        let _ = stop_tx.send(true);
        let proxy_result = match done_rx.recv_timeout(self.stop_grace) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => {
                // The panel is gone, so its log view can no longer show this.
                eprintln!(
                    "Proxy did not stop within {:?}, exiting anyway",
                    self.stop_grace
                );
                warn!("Proxy did not stop within {:?}", self.stop_grace);
                None
            }
            Err(RecvTimeoutError::Disconnected) if started.load(Ordering::SeqCst) => {
                error!("Proxy thread exited without reporting a result");
                return Err(FrontendError::ProxyAborted);
            }
            // The shell never started the proxy.
            Err(RecvTimeoutError::Disconnected) => None,
        };

        shell_result?;
        match proxy_result {
            Some(Err(e)) => Err(e.into()),
            Some(Ok(reason)) => {
                info!("Proxy stopped ({:?})", reason);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

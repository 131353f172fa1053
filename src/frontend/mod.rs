//! User-facing startup shells.
//!
//! A [`Frontend`] decides how the proxy is presented to the user. Every
//! implementation funnels into the same [`orchestrator::start_proxy`], so the
//! lifecycle (configuration, pool registration and release, listeners) is
//! identical regardless of the shell.
//!
//! [`orchestrator::start_proxy`]: crate::orchestrator::start_proxy

mod headless;
#[cfg(feature = "tray")]
pub mod tray;

use std::path::Path;

use thiserror::Error;

use crate::config::AddressOverride;
use crate::logging::LogBuffer;
use crate::orchestrator::StartupError;

pub use headless::Headless;

/// Which front-end is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendKind {
    /// Console only.
    Headless,
    /// Status panel with the proxy started from its callback.
    Tray,
}

/// Errors surfaced by a front-end.
#[derive(Debug, Error)]
pub enum FrontendError {
    /// Proxy startup failed.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// The tray shell failed.
    #[cfg(feature = "tray")]
    #[error("tray front-end failed: {0}")]
    Tray(#[from] tray::TrayError),

    /// The proxy was started but its thread ended without a result.
    #[cfg(feature = "tray")]
    #[error("proxy thread exited without reporting a result")]
    ProxyAborted,
}

/// A startup shell around the proxy.
pub trait Frontend {
    /// Which front-end this is.
    fn kind(&self) -> FrontendKind;

    /// Buffer that should receive log output, if the front-end owns the
    /// terminal.
    fn log_capture(&self) -> Option<LogBuffer> {
        None
    }

    /// Start the proxy and return once it has stopped.
    fn start_proxy(&mut self, config_path: &Path, overrides: &AddressOverride) -> Result<(), FrontendError>;
}

/// Pick the front-end for the `-gui` flag.
///
/// Falls back to [`Headless`] when the tray is not compiled in.
pub fn select(gui: bool) -> Box<dyn Frontend> {
    if gui {
        return tray_frontend();
    }
    Box::new(Headless)
}

#[cfg(feature = "tray")]
fn tray_frontend() -> Box<dyn Frontend> {
    Box::new(tray::TrayFrontend::new(tray::PanelShell::new(LogBuffer::default())))
}

#[cfg(not(feature = "tray"))]
fn tray_frontend() -> Box<dyn Frontend> {
    Box::new(Headless)
}

use std::path::Path;

use tokio::sync::watch;
use tracing::info;

use super::{Frontend, FrontendError, FrontendKind};
use crate::config::AddressOverride;
use crate::orchestrator;

/// Console front-end: starts the proxy directly and blocks until it stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl Frontend for Headless {
    fn kind(&self) -> FrontendKind {
        FrontendKind::Headless
    }

    fn start_proxy(&mut self, config_path: &Path, overrides: &AddressOverride) -> Result<(), FrontendError> {
        // Nothing but Ctrl-C stops a headless proxy.
        let (_stop_tx, stop_rx) = watch::channel(false);
        let reason = orchestrator::start_proxy(config_path, overrides, stop_rx)?;
        info!("Proxy stopped ({:?})", reason);
        Ok(())
    }
}

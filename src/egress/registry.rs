//! Registry of open egress pools.
//!
//! The registry is created by the startup routine and shared by `Arc` with
//! whatever creates pools. Pools are released through a [`ReleaseGuard`]
//! armed before the listeners start, so they are closed on every exit path:
//! normal return, early error return, panic unwinding, or interrupt.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::error::EgressPoolCloseError;
use super::pool::EgressPool;

/// Ordered collection of egress pools awaiting release.
#[derive(Default)]
pub struct EgressPoolRegistry {
    pools: Mutex<Vec<Arc<dyn EgressPool>>>,
}

/// Outcome of [`EgressPoolRegistry::close_all`].
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Number of pools closed successfully.
    pub closed: usize,
    /// Pools whose close failed.
    pub failures: Vec<EgressPoolCloseError>,
}

impl CloseReport {
    /// Number of pools a close was attempted on.
    pub fn attempted(&self) -> usize {
        self.closed + self.failures.len()
    }
}

impl EgressPoolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool. The registry will close it at shutdown.
    pub fn register(&self, pool: Arc<dyn EgressPool>) {
        debug!("Registered egress pool '{}'", pool.name());
        self.lock().push(pool);
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no pools are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Close every registered pool, most recently registered first.
    ///
    /// The registry is drained before any pool is closed, so each pool is
    /// closed exactly once no matter how often this is called. A failing
    /// close does not stop the remaining pools from being closed.
    pub fn close_all(&self) -> CloseReport {
        let pools = std::mem::take(&mut *self.lock());
        let mut report = CloseReport::default();

        for pool in pools.iter().rev() {
            match pool.close() {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    warn!("Failed to close egress pool '{}': {}", pool.name(), e);
                    report.failures.push(e);
                }
            }
        }

        if report.attempted() > 0 {
            info!(
                "Released {} egress pool(s), {} failure(s)",
                report.closed,
                report.failures.len()
            );
        }

        report
    }

    /// Arm a guard that closes all pools when dropped.
    pub fn release_guard(self: &Arc<Self>) -> ReleaseGuard {
        ReleaseGuard {
            registry: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn EgressPool>>> {
        // Pools must still be released after a panic elsewhere held the lock.
        self.pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Closes every pool of a registry when dropped.
#[must_use = "pools are released as soon as the guard is dropped"]
pub struct ReleaseGuard {
    registry: Arc<EgressPoolRegistry>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let _ = self.registry.close_all();
    }
}

//! Egress pools and their lifecycle.
//!
//! An egress pool is an outbound network identity: a set of local source
//! addresses outbound connections are bound to. Pools are created from the
//! configuration file, registered with an [`EgressPoolRegistry`] before the
//! listeners start, and released exactly once when the process shuts down.
//!
//! ```text
//! Config ──► LocalAddressPool ──┬──► EgressPoolRegistry ──► ReleaseGuard (close on drop)
//!                               └──► Dialer (select source address, never close)
//! ```

mod dialer;
mod error;
mod pool;
mod registry;

pub use dialer::Dialer;
pub use error::EgressPoolCloseError;
pub use pool::{EgressPool, LocalAddressPool};
pub use registry::{CloseReport, EgressPoolRegistry, ReleaseGuard};

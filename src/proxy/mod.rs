//! The two proxy front doors and their joint lifecycle.
//!
//! - [`Socks5Server`]: SOCKS5 `CONNECT` (RFC 1928, no authentication)
//! - [`HttpProxyServer`]: HTTP `CONNECT` tunneling and plain HTTP forwarding
//! - [`ListenerCoordinator`]: runs both accept loops concurrently and returns
//!   only after both have ended
//!
//! Both servers dial outbound connections through the same
//! [`Dialer`](crate::egress::Dialer), so egress pool selection is shared.
//!
//! # Architecture
//!
//! ```text
//!   SOCKS5 client ──► Socks5Server ────┐
//!                                      ├──► Dialer ──► target
//!   HTTP client ────► HttpProxyServer ─┘
//! ```

pub mod connect;
pub mod coordinator;
pub mod error;
pub mod server;
pub mod signal;
pub mod socks5;

pub use coordinator::{AcceptLoop, ListenerCoordinator};
pub use error::{ProxyError, ProxyResult};
pub use server::HttpProxyServer;
pub use signal::{ShutdownNotifier, ShutdownWaiter, shutdown_signal};
pub use socks5::Socks5Server;

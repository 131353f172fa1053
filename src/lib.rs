//! duoproxy: dual-protocol SOCKS5 and HTTP proxy
//!
//! This crate runs a SOCKS5 and an HTTP proxy side by side from one
//! configuration file, dialing outbound connections through egress pools
//! (sets of local source addresses) that are released exactly once when the
//! process stops.
//!
//! # Architecture
//!
//! - **Config**: JSON configuration file plus command-line address overrides
//! - **Egress**: Egress pools, their registry and the outbound dialer
//! - **Proxy**: SOCKS5 and HTTP accept loops and their coordinator
//! - **Orchestrator**: Startup, runtime ownership and shutdown
//! - **Frontend**: Headless console or terminal status panel
//! - **Logging**: Tracing subscriber setup and in-memory log capture

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod egress;
pub mod frontend;
pub mod logging;
pub mod orchestrator;
pub mod proxy;

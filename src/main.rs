//! duoproxy: dual-protocol SOCKS5 and HTTP proxy.
//!
//! Entry point for the binary. Parses the command line, picks the front-end,
//! installs logging (into the panel's buffer when the tray front-end owns the
//! terminal) and hands control to the front-end.
//!
//! Any startup failure is printed to stderr and the process exits with
//! status 1.

use std::process::ExitCode;

use anyhow::{Context, Result};
use duoproxy::{cli::Cli, frontend, frontend::FrontendKind, logging};
use tracing::{debug, warn};

fn main() -> ExitCode {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse_normalized();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut frontend = frontend::select(cli.gui);

    logging::init_tracing(cli.verbose, frontend.log_capture())
        .context("Failed to initialize tracing subscriber")?;

    debug!("Parsed CLI arguments: {:?}", cli);
    if cli.gui && frontend.kind() != FrontendKind::Tray {
        warn!("Tray front-end is not available in this build, running headless");
    }
    debug!("Using {:?} front-end", frontend.kind());

    frontend.start_proxy(&cli.config, &cli.overrides())?;
    Ok(())
}

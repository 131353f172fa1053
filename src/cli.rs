//! Command-line interface definitions for duoproxy.
//!
//! Uses clap's derive API. The historical single-dash spellings `-hb` and
//! `-gui` (with or without `=value`) are rewritten to their long forms by
//! [`normalize_args`] before parsing, since clap short flags are single
//! characters and `-h` is help. `--b` is accepted as an alias of `--bind`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{AddressOverride, DEFAULT_CONFIG_PATH};

/// Dual-protocol SOCKS5 and HTTP proxy.
///
/// Listens for SOCKS5 and HTTP proxy clients on the addresses from the
/// configuration file, optionally overridden on the command line, and dials
/// outbound connections through the configured egress pools.
#[derive(Parser, Debug)]
#[command(name = "duoproxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// SOCKS5 listen address, replacing the configured one.
    #[arg(short = 'b', long = "bind", visible_alias = "b", value_name = "ADDR")]
    pub socks5_bind: Option<String>,

    /// HTTP listen address, replacing the configured one (also `-hb`).
    #[arg(long = "hb", value_name = "ADDR")]
    pub http_bind: Option<String>,

    /// Run with the status panel instead of the console (also `-gui`).
    ///
    /// Accepts an explicit `--gui=true` or `--gui=false`.
    #[arg(
        long = "gui",
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub gui: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse the process arguments, accepting the single-dash long flags.
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Address overrides given on the command line.
    pub fn overrides(&self) -> AddressOverride {
        AddressOverride::new(self.socks5_bind.clone(), self.http_bind.clone())
    }
}

/// Rewrite `-hb` and `-gui` (and their `=value` forms) to `--hb` and `--gui`.
///
/// Everything after a `--` terminator is passed through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut terminated = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg: OsString| {
            if terminated {
                return arg;
            }
            let replacement = match arg.to_str() {
                Some("--") => {
                    terminated = true;
                    None
                }
                Some("-hb") => Some(OsString::from("--hb")),
                Some("-gui") => Some(OsString::from("--gui")),
                Some(s) if s.starts_with("-hb=") || s.starts_with("-gui=") => {
                    Some(OsString::from(format!("-{}", s)))
                }
                _ => None,
            };
            replacement.unwrap_or(arg)
        })
        .collect()
}

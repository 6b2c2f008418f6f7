//! # Cli
//!
//! Command line interface of the control plane. Help and version handling, as
//! well as reporting unknown options or missing arguments, are left to clap.
use std::path::PathBuf;

use clap::{builder::PossibleValuesParser, Parser};

use crate::core::{maps::SESSION_MAP_PIN, program::DEFAULT_OBJECT};

/// Control plane of the kernel hooking agent
///
/// hookctl loads the kernel program, validates the maps it shares with
/// userspace, installs the hooks and executes the commands the kernel program
/// reports until interrupted.
#[derive(Parser, Debug)]
#[command(name = "hookctl", version)]
pub(crate) struct Cli {
    #[arg(
        short = 't',
        long = "iface",
        value_name = "NETWORK INTERFACE",
        help = "Activate the network filter (XDP) on the given interface"
    )]
    pub(crate) iface: Option<String>,
    #[arg(short, long, help = "Verbose mode, forwards libbpf debug output")]
    pub(crate) verbose: bool,
    #[arg(
        long,
        value_parser=PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]),
        default_value = "info",
        help = "Log level",
    )]
    pub(crate) log_level: String,
    #[arg(
        long,
        default_value = DEFAULT_OBJECT,
        help = "Path to the compiled kernel program object"
    )]
    pub(crate) object: PathBuf,
    #[arg(
        long,
        default_value = SESSION_MAP_PIN,
        help = "Pin path of the session map shared with the kernel program"
    )]
    pub(crate) map_pin: PathBuf,
}

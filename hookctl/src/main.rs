use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod agent;
mod cli;
mod core;
mod dispatch;
mod helpers;

// Re-export events crate. It's not really an import but a re-export so events appear as module
// inside the crate rather than an external crate. However, clippy doesn't like it.
#[allow(clippy::single_component_path_imports)]
use events;

use crate::{cli::Cli, helpers::logger::Logger};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = LevelFilter::from_str(&cli.log_level)?;
    Logger::init(log_level)?;

    agent::run(&cli)
}

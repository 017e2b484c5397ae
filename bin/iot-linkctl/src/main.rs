//! ---
//! iot_section: "05-cli"
//! iot_subsection: "binary"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Control CLI for operators sending actions to IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use iot_link_common::config::AppConfig;

mod action;
mod boxes;

const DEFAULT_CONFIG: &str = "configs/iot-link.toml";
const EXAMPLE_CONFIG: &str = "configs/iot-link.example.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "IoT Link control utility",
    long_about = None
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Send one action to a device through the transport cascade")]
    Action(action::ActionOptions),
    #[command(about = "List the boxes known to the configuration")]
    Boxes,
}

fn load_config(explicit: Option<&PathBuf>) -> Result<AppConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG));
    candidates.push(PathBuf::from(EXAMPLE_CONFIG));
    AppConfig::load(&candidates)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("iot-linkctl {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let Some(command) = cli.command else {
        println!("no command given; see --help");
        return Ok(());
    };
    let config = load_config(cli.config.as_ref())?;
    match command {
        Commands::Action(options) => action::run(&config, options)?,
        Commands::Boxes => boxes::run(&config),
    }
    Ok(())
}

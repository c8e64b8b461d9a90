//! Atlas Installer CLI - Command-line interface
//!
//! Headless front end for the `atlas_installer` library: installs Atlas
//! Interactivo, reports installation status and manages the configuration
//! file.

mod commands;
mod error;
mod progress;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::install::InstallArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "atlas-installer", version, about = "Install Atlas Interactivo")]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and install Atlas Interactivo (skipped if already installed)
    Install(InstallArgs),

    /// Show whether a destination holds a complete installation
    Status {
        /// Installation directory (default: from config)
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Write a configuration file with default settings
    Init,

    /// View or modify configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let global = GlobalArgs {
        config: cli.config,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Commands::Install(args) => commands::install::run(&global, args),
        Commands::Status { dest } => commands::status::run(&global, dest),
        Commands::Init => commands::init::run(&global),
        Commands::Config(command) => commands::config::run(&global, command),
    };

    if let Err(e) = result {
        if !matches!(e, CliError::Cancelled) {
            eprintln!("Error: {}", e);
        }
        process::exit(e.exit_code());
    }
}

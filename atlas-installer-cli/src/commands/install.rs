//! Install command - ensure Atlas Interactivo is installed.

use std::path::PathBuf;

use atlas_installer::installer::download::format_size;
use atlas_installer::installer::{InstallOutcome, InstallRequest, Installer, ToolKind};
use clap::Args;
use console::style;
use tracing::{info, warn};

use crate::error::CliError;
use crate::progress::ProgressDisplay;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Arguments for the install command. Each overrides the config file.
#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Archive URL (http, https or file)
    #[arg(long)]
    pub url: Option<String>,

    /// Installation directory
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Total download attempts
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// Directory for the temporary archive
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Extraction tool to use (tar or 7z)
    #[arg(long)]
    pub tool: Option<ToolKind>,

    /// Always download from the start instead of resuming
    #[arg(long)]
    pub no_resume: bool,

    /// Request a desktop shortcut
    #[arg(long)]
    pub desktop_shortcut: Option<bool>,

    /// Request a start menu entry
    #[arg(long)]
    pub menu_shortcut: Option<bool>,
}

/// Run the install command.
pub fn run(global: &GlobalArgs, args: InstallArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("install");
    let file = runner.config();

    // CLI > config file > defaults
    let url = args.url.or_else(|| file.source.url.clone()).ok_or_else(|| {
        CliError::Config(
            "No source URL. Set url in the [source] section of config.ini or use --url"
                .to_string(),
        )
    })?;
    let dest = args.dest.unwrap_or_else(|| file.install.dest.clone());

    let mut config = file.installer_config();
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = temp_dir;
    }
    if let Some(tool) = args.tool {
        config.extractor.preference = vec![tool];
    }
    if args.no_resume {
        config.transfer.resume = false;
    }

    let mut options = file.install_options();
    if let Some(retries) = args.retries {
        options.max_retries = retries;
    }
    if let Some(desktop) = args.desktop_shortcut {
        options.desktop_shortcut = desktop;
    }
    if let Some(menu) = args.menu_shortcut {
        options.menu_shortcut = menu;
    }

    println!("Atlas Installer v{}", atlas_installer::VERSION);
    println!("====================");
    println!();
    println!("Source:      {}", url);
    println!("Destination: {}", dest.display());
    println!("Attempts:    {}", options.max_retries);
    println!();
    println!("Press Ctrl+C to cancel");
    println!();

    let installer = Installer::new(config)?;
    let request = InstallRequest::new(url, dest).with_options(options);
    let mut handle = installer.spawn(request)?;

    let cancel = handle.cancellation_token();
    ctrlc::set_handler(move || {
        if !cancel.is_cancelled() {
            warn!("Received interrupt, cancelling installation");
        }
        cancel.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let display = ProgressDisplay::new();
    while let Some(event) = handle.events().blocking_recv() {
        display.handle(&event);
    }
    drop(display);

    match handle.join() {
        InstallOutcome::Completed(summary) => {
            info!(files = summary.file_count, "Install command finished");
            println!("{} Atlas Interactivo installed", style("✓").green().bold());
            println!("  Location:   {}", summary.install_path.display());
            println!("  Files:      {}", summary.file_count);
            println!(
                "  Downloaded: {} in {} attempt(s)",
                format_size(summary.bytes_downloaded),
                summary.attempts
            );
            println!("  Extracted with {}", summary.extraction_tool);
            if summary.partial_extraction {
                println!(
                    "{} Only part of the archive could be extracted",
                    style("!").yellow().bold()
                );
            }
            Ok(())
        }
        InstallOutcome::AlreadyInstalled => {
            println!(
                "{} Atlas Interactivo is already installed",
                style("✓").green().bold()
            );
            Ok(())
        }
        InstallOutcome::Failed(reason) => Err(CliError::Failed(reason)),
        InstallOutcome::Cancelled => {
            println!("{} Installation cancelled", style("✗").red().bold());
            Err(CliError::Cancelled)
        }
    }
}

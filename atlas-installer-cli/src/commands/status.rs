//! Status command - report on an installation directory.

use std::path::PathBuf;

use atlas_installer::installer::{InstallManifest, InstallationProbe};
use console::style;

use crate::error::CliError;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the status command.
pub fn run(global: &GlobalArgs, dest: Option<PathBuf>) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    let file = runner.config();
    let dest = dest.unwrap_or_else(|| file.install.dest.clone());

    let config = file.installer_config();
    let manifest_name = config.manifest_file_name();
    let probe = InstallationProbe::new(config.probe, manifest_name.clone());
    let report = probe.inspect(&dest);

    println!("Installation: {}", dest.display());
    if !report.exists {
        println!("  Status: {}", style("not installed").yellow());
        return Ok(());
    }

    if report.complete {
        println!("  Status: {}", style("installed").green());
    } else {
        println!("  Status: {}", style("incomplete").yellow());
    }
    if let Some(marker) = &report.marker {
        println!("  Marker: {}", marker);
    }
    if !report.has_manifest && report.marker.is_none() {
        println!("  Files:  {}", report.file_count);
    }

    if report.has_manifest {
        match InstallManifest::load(&dest.join(&manifest_name)) {
            Ok(manifest) => {
                println!();
                println!("Manifest ({})", manifest_name);
                println!("  Version:      {}", manifest.version);
                println!(
                    "  Installed:    {}",
                    manifest.install_date.format("%Y-%m-%d %H:%M:%S")
                );
                println!("  Total files:  {}", manifest.total_files);
                if !manifest.extraction_tool.is_empty() {
                    println!("  Tool:         {}", manifest.extraction_tool);
                }
                if !manifest.platform.is_empty() {
                    println!("  Platform:     {}", manifest.platform);
                }
                if manifest.partial {
                    println!("  {}", style("Partial extraction").yellow());
                }
            }
            Err(e) => println!("  Manifest unreadable: {}", e),
        }
    }

    Ok(())
}

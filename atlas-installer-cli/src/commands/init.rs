//! Init command - initialize configuration file.

use atlas_installer::config::ConfigFile;

use crate::error::CliError;
use crate::runner::resolve_config_path;
use crate::GlobalArgs;

/// Run the init command.
///
/// Existing settings are kept; missing ones are filled with defaults.
pub fn run(global: &GlobalArgs) -> Result<(), CliError> {
    let path = resolve_config_path(global);
    let existed = path.exists();

    let config = ConfigFile::load_from(&path).unwrap_or_default();
    config.save_to(&path)?;

    if existed {
        println!("Updated configuration file: {}", path.display());
    } else {
        println!("Created configuration file: {}", path.display());
    }
    println!();
    if config.source.url.is_none() {
        println!("Set the archive URL before installing:");
        println!("  atlas-installer config set source.url <URL>");
        println!();
    }
    println!("Edit this file to customize the installer.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

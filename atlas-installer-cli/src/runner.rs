//! Shared command setup: configuration file and logging.

use std::path::PathBuf;

use atlas_installer::config::{config_file_path, ConfigFile};
use atlas_installer::logging::{init_logging, LoggingGuard};
use tracing::info;

use crate::error::CliError;
use crate::GlobalArgs;

/// Loaded configuration plus the logging guard for the command's lifetime.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _logging: LoggingGuard,
}

impl CliRunner {
    pub fn new(global: &GlobalArgs) -> Result<Self, CliError> {
        let config_path = resolve_config_path(global);
        let config = ConfigFile::load_from(&config_path)?;

        let mut log_config = config.log_config();
        if global.verbose {
            log_config = log_config.verbose();
        }
        log_config.ansi = console::colors_enabled_stderr();
        let logging = init_logging(&log_config)?;

        Ok(Self {
            config,
            config_path,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = atlas_installer::VERSION,
            command,
            config = %self.config_path.display(),
            "atlas-installer starting"
        );
    }
}

/// `--config` or the default location.
pub fn resolve_config_path(global: &GlobalArgs) -> PathBuf {
    global.config.clone().unwrap_or_else(config_file_path)
}

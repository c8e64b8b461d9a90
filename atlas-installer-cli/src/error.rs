//! CLI error type.

use std::fmt;
use std::io;

use atlas_installer::config::ConfigError;
use atlas_installer::installer::{FailureReason, InstallError};
use atlas_installer::logging::LoggingError;

/// Exit code for a failed command.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code after Ctrl+C (128 + SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug)]
pub enum CliError {
    /// Bad or missing settings.
    Config(String),
    /// The configuration file could not be read or written.
    ConfigFile(ConfigError),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The installer could not be started.
    Install(InstallError),
    /// The installation ran and failed.
    Failed(FailureReason),
    /// The user cancelled.
    Cancelled,
    Io(io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Install(e) => write!(f, "{}: {}", e.user_message(), e),
            CliError::Failed(reason) => write!(f, "{}", reason),
            CliError::Cancelled => write!(f, "Installation cancelled"),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Install(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<InstallError> for CliError {
    fn from(e: InstallError) -> Self {
        CliError::Install(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

//! Configuration file support.
//!
//! Settings live in an INI file at `~/.config/atlas-installer/config.ini`
//! (platform config directory). A missing file means defaults; CLI
//! arguments override whatever the file says.
//!
//! ```ini
//! [source]
//! url = https://mirror.example/Atlas_Interactivo.tar
//!
//! [install]
//! dest = /home/user/AtlasInteractivo
//! retries = 3
//! desktop_shortcut = true
//! menu_shortcut = true
//! min_free_space_gb = 15
//!
//! [download]
//! temp_dir = /tmp
//! timeout = 10800
//! chunk_size = 81920
//! resume = true
//!
//! [extract]
//! tool = 7z
//! tool_path = /usr/bin/7z
//! timeout = 600
//! flatten = true
//!
//! [logging]
//! level = info
//! file = /home/user/.local/share/atlas-installer/atlas-installer.log
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{EscapePolicy, Ini, ParseOption};
use thiserror::Error;

use crate::installer::{
    InstallOptions, InstallerConfig, ToolKind, DEFAULT_CHUNK_SIZE, DEFAULT_EXTRACT_TIMEOUT,
    DEFAULT_REQUIRED_FREE_SPACE, DEFAULT_TRANSFER_TIMEOUT,
};
use crate::logging::{default_log_file, LogConfig};

const APP_DIR: &str = "atlas-installer";
const CONFIG_FILE: &str = "config.ini";
const DEFAULT_INSTALL_DIR: &str = "AtlasInteractivo";
const GIB: u64 = 1024 * 1024 * 1024;

/// Errors from loading, saving or editing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Path of the user's configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_install_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_INSTALL_DIR)
}

/// `[source]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    /// Archive URL (`http`, `https` or `file`).
    pub url: Option<String>,
}

/// `[install]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    pub dest: PathBuf,
    /// Total transfer attempts.
    pub retries: u32,
    pub desktop_shortcut: bool,
    pub menu_shortcut: bool,
    /// Free space required before downloading, in GiB (0 disables the check).
    pub min_free_space_gb: u64,
}

impl Default for InstallSettings {
    fn default() -> Self {
        let options = InstallOptions::default();
        Self {
            dest: default_install_dir(),
            retries: options.max_retries,
            desktop_shortcut: options.desktop_shortcut,
            menu_shortcut: options.menu_shortcut,
            min_free_space_gb: DEFAULT_REQUIRED_FREE_SPACE / GIB,
        }
    }
}

/// `[download]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Directory for the temporary archive (system temp dir when unset).
    pub temp_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub chunk_size: usize,
    pub resume: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            temp_dir: None,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            resume: true,
        }
    }
}

/// `[extract]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSettings {
    /// Force one tool instead of the default preference order.
    pub tool: Option<ToolKind>,
    pub tool_path: Option<PathBuf>,
    pub timeout: Duration,
    /// Lift a single top-level wrapper directory into the destination.
    pub flatten: bool,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            tool: None,
            tool_path: None,
            timeout: DEFAULT_EXTRACT_TIMEOUT,
            flatten: true,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `atlas_installer=debug`.
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: default_log_file(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub source: SourceSettings,
    pub install: InstallSettings,
    pub download: DownloadSettings,
    pub extract: ExtractSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        // Backslashes are literal so Windows paths survive
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_file_opt(path, options).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories. Unset values are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source: io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file_policy(path, EscapePolicy::Nothing)
            .map_err(write_error)
    }

    /// Installer core configuration derived from this file.
    pub fn installer_config(&self) -> InstallerConfig {
        let mut config = InstallerConfig::default();
        if let Some(temp_dir) = &self.download.temp_dir {
            config.temp_dir = temp_dir.clone();
        }
        config.transfer.timeout = self.download.timeout;
        config.transfer.chunk_size = self.download.chunk_size;
        config.transfer.resume = self.download.resume;
        if let Some(tool) = self.extract.tool {
            config.extractor.preference = vec![tool];
        }
        config.extractor.tool_path = self.extract.tool_path.clone();
        config.extractor.timeout = self.extract.timeout;
        config.extractor.flatten_wrapper = self.extract.flatten;
        config.required_free_space = match self.install.min_free_space_gb {
            0 => None,
            gb => Some(gb.saturating_mul(GIB)),
        };
        config.retry = config.retry.with_max_attempts(self.install.retries);
        config
    }

    /// Per-request options derived from `[install]`.
    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            max_retries: self.install.retries,
            desktop_shortcut: self.install.desktop_shortcut,
            menu_shortcut: self.install.menu_shortcut,
        }
    }

    /// Logging setup derived from `[logging]`.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.logging.level.clone(),
            file: self.logging.file.clone(),
            ..LogConfig::default()
        }
    }
}

/// Every setting addressable as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    SourceUrl,
    InstallDest,
    InstallRetries,
    InstallDesktopShortcut,
    InstallMenuShortcut,
    InstallMinFreeSpace,
    DownloadTempDir,
    DownloadTimeout,
    DownloadChunkSize,
    DownloadResume,
    ExtractTool,
    ExtractToolPath,
    ExtractTimeout,
    ExtractFlatten,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// All keys, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::SourceUrl,
            Self::InstallDest,
            Self::InstallRetries,
            Self::InstallDesktopShortcut,
            Self::InstallMenuShortcut,
            Self::InstallMinFreeSpace,
            Self::DownloadTempDir,
            Self::DownloadTimeout,
            Self::DownloadChunkSize,
            Self::DownloadResume,
            Self::ExtractTool,
            Self::ExtractToolPath,
            Self::ExtractTimeout,
            Self::ExtractFlatten,
            Self::LoggingLevel,
            Self::LoggingFile,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::SourceUrl => "source",
            Self::InstallDest
            | Self::InstallRetries
            | Self::InstallDesktopShortcut
            | Self::InstallMenuShortcut
            | Self::InstallMinFreeSpace => "install",
            Self::DownloadTempDir
            | Self::DownloadTimeout
            | Self::DownloadChunkSize
            | Self::DownloadResume => "download",
            Self::ExtractTool
            | Self::ExtractToolPath
            | Self::ExtractTimeout
            | Self::ExtractFlatten => "extract",
            Self::LoggingLevel | Self::LoggingFile => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::SourceUrl => "url",
            Self::InstallDest => "dest",
            Self::InstallRetries => "retries",
            Self::InstallDesktopShortcut => "desktop_shortcut",
            Self::InstallMenuShortcut => "menu_shortcut",
            Self::InstallMinFreeSpace => "min_free_space_gb",
            Self::DownloadTempDir => "temp_dir",
            Self::DownloadTimeout | Self::ExtractTimeout => "timeout",
            Self::DownloadChunkSize => "chunk_size",
            Self::DownloadResume => "resume",
            Self::ExtractTool => "tool",
            Self::ExtractToolPath => "tool_path",
            Self::ExtractFlatten => "flatten",
            Self::LoggingLevel => "level",
            Self::LoggingFile => "file",
        }
    }

    /// `section.key`
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as written to the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        fn path(value: &Option<PathBuf>) -> String {
            value
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        }

        match self {
            Self::SourceUrl => config.source.url.clone().unwrap_or_default(),
            Self::InstallDest => config.install.dest.display().to_string(),
            Self::InstallRetries => config.install.retries.to_string(),
            Self::InstallDesktopShortcut => config.install.desktop_shortcut.to_string(),
            Self::InstallMenuShortcut => config.install.menu_shortcut.to_string(),
            Self::InstallMinFreeSpace => config.install.min_free_space_gb.to_string(),
            Self::DownloadTempDir => path(&config.download.temp_dir),
            Self::DownloadTimeout => config.download.timeout.as_secs().to_string(),
            Self::DownloadChunkSize => config.download.chunk_size.to_string(),
            Self::DownloadResume => config.download.resume.to_string(),
            Self::ExtractTool => match config.extract.tool {
                Some(ToolKind::Tar) => "tar".to_string(),
                Some(ToolKind::SevenZip) => "7z".to_string(),
                None => String::new(),
            },
            Self::ExtractToolPath => path(&config.extract.tool_path),
            Self::ExtractTimeout => config.extract.timeout.as_secs().to_string(),
            Self::ExtractFlatten => config.extract.flatten.to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingFile => path(&config.logging.file),
        }
    }

    /// Parse `value` and store it. An empty value clears optional settings.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let optional_path = || (!value.is_empty()).then(|| PathBuf::from(value));

        match self {
            Self::SourceUrl => {
                config.source.url = (!value.is_empty()).then(|| value.to_string());
            }
            Self::InstallDest => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.install.dest = PathBuf::from(value);
            }
            Self::InstallRetries => {
                let retries: u32 = self.parse_number(value)?;
                if retries == 0 {
                    return Err(self.invalid(value, "must be at least 1"));
                }
                config.install.retries = retries;
            }
            Self::InstallDesktopShortcut => config.install.desktop_shortcut = self.parse_bool(value)?,
            Self::InstallMenuShortcut => config.install.menu_shortcut = self.parse_bool(value)?,
            Self::InstallMinFreeSpace => {
                config.install.min_free_space_gb = self.parse_number(value)?;
            }
            Self::DownloadTempDir => config.download.temp_dir = optional_path(),
            Self::DownloadTimeout => config.download.timeout = self.parse_seconds(value)?,
            Self::DownloadChunkSize => {
                let size: usize = self.parse_number(value)?;
                if size == 0 {
                    return Err(self.invalid(value, "must be greater than zero"));
                }
                config.download.chunk_size = size;
            }
            Self::DownloadResume => config.download.resume = self.parse_bool(value)?,
            Self::ExtractTool => {
                config.extract.tool = if value.is_empty() {
                    None
                } else {
                    Some(
                        value
                            .parse()
                            .map_err(|_| self.invalid(value, "expected 'tar' or '7z'"))?,
                    )
                };
            }
            Self::ExtractToolPath => config.extract.tool_path = optional_path(),
            Self::ExtractTimeout => config.extract.timeout = self.parse_seconds(value)?,
            Self::ExtractFlatten => config.extract.flatten = self.parse_bool(value)?,
            Self::LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.logging.level = value.to_string();
            }
            Self::LoggingFile => config.logging.file = optional_path(),
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn parse_number<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| self.invalid(value, e.to_string()))
    }

    fn parse_seconds(&self, value: &str) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse_number(value)?;
        if secs == 0 {
            return Err(self.invalid(value, "must be greater than zero"));
        }
        Ok(Duration::from_secs(secs))
    }

    fn parse_bool(&self, value: &str) -> Result<bool, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

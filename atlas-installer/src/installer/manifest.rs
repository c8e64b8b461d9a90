//! Installation manifest.
//!
//! A small JSON file written into the destination after a successful
//! installation. Its presence is the persisted proof that the installation
//! finished.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::error::{ErrContext, InstallResult};
use super::outcome::InstallSummary;

/// Contents of `.<product>_version.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallManifest {
    pub version: String,
    pub installed: bool,
    pub install_path: PathBuf,
    pub install_date: DateTime<Local>,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub bytes_downloaded: u64,
    #[serde(default)]
    pub download_attempts: u32,
    #[serde(default)]
    pub extraction_tool: String,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub installer_version: String,
}

impl InstallManifest {
    /// Describe a just-finished installation.
    pub fn from_summary(version: impl Into<String>, summary: &InstallSummary) -> Self {
        Self {
            version: version.into(),
            installed: true,
            install_path: summary.install_path.clone(),
            install_date: Local::now(),
            total_files: summary.file_count,
            bytes_downloaded: summary.bytes_downloaded,
            download_attempts: summary.attempts,
            extraction_tool: summary.extraction_tool.clone(),
            partial: summary.partial_extraction,
            platform: format!("{}-{}", env::consts::OS, env::consts::ARCH),
            installer_version: crate::VERSION.to_string(),
        }
    }

    /// Write the manifest into `dir` as `file_name`.
    ///
    /// The file is written under a temporary name and renamed into place,
    /// so readers never see a half-written manifest.
    pub fn write(&self, dir: &Path, file_name: &str) -> InstallResult<PathBuf> {
        let path = dir.join(file_name);
        let staging = dir.join(format!("{}.tmp", file_name));

        let json = serde_json::to_vec_pretty(self)
            .context(|| format!("failed to serialize {}", path.display()))?;
        {
            let mut file = fs::File::create(&staging)
                .context(|| format!("failed to create {}", staging.display()))?;
            file.write_all(&json)
                .context(|| format!("failed to write {}", staging.display()))?;
            file.sync_all()
                .context(|| format!("failed to sync {}", staging.display()))?;
        }
        fs::rename(&staging, &path).context(|| {
            let _ = fs::remove_file(&staging);
            format!("failed to move manifest into {}", path.display())
        })?;

        Ok(path)
    }

    /// Read a manifest back.
    pub fn load(path: &Path) -> InstallResult<Self> {
        let contents =
            fs::read(path).context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&contents)
            .context(|| format!("failed to parse {}", path.display()))
    }
}

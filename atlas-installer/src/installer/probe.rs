//! Installation state probe.
//!
//! Decides whether a destination already holds a complete installation.
//! Read-only; a missing directory is simply "not installed".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::config::ProbeConfig;

/// Files and directories found under a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeCount {
    pub files: usize,
    pub dirs: usize,
}

/// Count files and directories under `dir`, recursively.
///
/// With `stop_after_files`, counting stops as soon as more files than that
/// have been seen. A missing directory counts as empty.
pub fn count_tree(dir: &Path, stop_after_files: Option<usize>) -> io::Result<TreeCount> {
    let mut count = TreeCount::default();
    if !dir.is_dir() {
        return Ok(count);
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)?.flatten() {
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(_) => continue,
            };
            if file_type.is_dir() {
                count.dirs += 1;
                pending.push(entry.path());
            } else {
                count.files += 1;
                if stop_after_files.is_some_and(|limit| count.files > limit) {
                    return Ok(count);
                }
            }
        }
    }
    Ok(count)
}

/// What the probe found at a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub path: PathBuf,
    /// Whether the directory exists.
    pub exists: bool,
    /// Whether the installation manifest is present.
    pub has_manifest: bool,
    /// First marker file found, if any.
    pub marker: Option<String>,
    /// Files counted (counting stops once the threshold is exceeded).
    pub file_count: usize,
    /// The verdict.
    pub complete: bool,
}

/// Checks destinations for a previous installation.
#[derive(Debug, Clone)]
pub struct InstallationProbe {
    config: ProbeConfig,
    manifest_name: String,
}

impl InstallationProbe {
    /// Create a probe that also treats `manifest_name` as a marker.
    pub fn new(config: ProbeConfig, manifest_name: impl Into<String>) -> Self {
        Self {
            config,
            manifest_name: manifest_name.into(),
        }
    }

    /// Inspect `path`.
    ///
    /// Complete means: the manifest or any marker file is present, or more
    /// than `min_file_count` files exist. With `require_manifest`, only the
    /// manifest counts.
    pub fn inspect(&self, path: &Path) -> ProbeReport {
        let mut report = ProbeReport {
            path: path.to_path_buf(),
            exists: path.is_dir(),
            has_manifest: false,
            marker: None,
            file_count: 0,
            complete: false,
        };
        if !report.exists {
            return report;
        }

        report.has_manifest = path.join(&self.manifest_name).is_file();
        if self.config.require_manifest {
            report.complete = report.has_manifest;
            return report;
        }

        report.marker = self
            .config
            .markers
            .iter()
            .find(|marker| path.join(marker).is_file())
            .cloned();

        report.file_count = count_tree(path, Some(self.config.min_file_count))
            .map(|count| count.files)
            .unwrap_or(0);

        report.complete = report.has_manifest
            || report.marker.is_some()
            || report.file_count > self.config.min_file_count;
        report
    }

    /// Whether `path` holds a complete installation.
    pub fn is_complete(&self, path: &Path) -> bool {
        self.inspect(path).complete
    }
}

//! Archive extraction through an external tool.
//!
//! This module handles:
//! - Waiting out a transfer that has not released the archive yet
//! - Locating a decompression tool before touching the destination
//! - Running the tool under a timeout, with progress and cancellation
//! - Salvaging a subset of entries when the tool fails fatally
//! - Lifting a single wrapper directory into the destination
//! - Verifying that something was actually extracted

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::layout::{flatten_wrapper, top_level_names};
use super::process::{run_supervised, ProcessExit, Stream};
use super::tools::{ArchiveTool, ToolLocator};
use crate::installer::config::ExtractorConfig;
use crate::installer::error::{ErrContext, InstallError, InstallResult};
use crate::installer::events::Reporter;
use crate::installer::outcome::InstallPhase;
use crate::installer::probe::count_tree;
use crate::installer::retry::wait_or_cancel;
use crate::installer::traits::ArchiveExtractor;

/// Entries passed to the tool per salvage invocation.
const SALVAGE_BATCH: usize = 50;

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files under the destination afterwards, including any that were
    /// there before extraction started.
    pub file_count: usize,
    /// Directories under the destination afterwards, counted the same way.
    pub dir_count: usize,
    /// Name of the tool that did the work.
    pub tool: String,
    /// Whether only a subset of the archive could be salvaged.
    pub partial: bool,
}

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{1,3})%").expect("valid progress regex"))
}

/// Parse a tool progress line such as `" 42% 17 - data/file.bin"`.
fn parse_progress(line: &str) -> Option<f64> {
    progress_pattern()
        .captures(line.trim_start())
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|percent| *percent <= 100.0)
}

/// Extractor that shells out to tar or 7-Zip.
#[derive(Debug, Clone)]
pub struct ToolExtractor {
    config: ExtractorConfig,
    locator: ToolLocator,
}

impl ToolExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            locator: ToolLocator::new(),
        }
    }

    /// Use a custom tool locator (builder pattern).
    pub fn with_locator(mut self, locator: ToolLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Pick the tool this extractor would use.
    pub fn resolve_tool(&self) -> InstallResult<ArchiveTool> {
        self.locator
            .resolve(&self.config.preference, self.config.tool_path.as_deref())
    }

    /// Make sure the archive can be opened for reading.
    ///
    /// The transfer engine closes the file before returning, but the OS (or
    /// a virus scanner) may still hold it briefly, so one retry is allowed.
    fn wait_until_readable(
        &self,
        archive: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<()> {
        if File::open(archive).is_ok() {
            return Ok(());
        }

        reporter.warn(format!(
            "Archive is in use, retrying in {}s",
            self.config.lock_retry_delay.as_secs()
        ));
        if !wait_or_cancel(self.config.lock_retry_delay, cancel) {
            return Err(InstallError::Cancelled);
        }

        File::open(archive)
            .map(|_| ())
            .map_err(|e| InstallError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: format!("archive cannot be opened: {}", e),
            })
    }

    /// Run the tool once with the given arguments.
    fn run_tool(
        &self,
        tool: &ArchiveTool,
        args: Vec<OsString>,
        cancel: &CancellationToken,
        on_line: &(dyn Fn(Stream, &str) + Sync),
    ) -> InstallResult<ProcessExit> {
        let mut command = Command::new(&tool.path);
        command.args(args);
        run_supervised(&mut command, self.config.timeout, cancel, on_line)
            .context(|| format!("failed to run {}", tool))
    }

    /// Best-effort extraction of a bounded subset of file entries.
    ///
    /// Returns the number of files present afterwards. Only cancellation is
    /// reported as an error.
    fn salvage(
        &self,
        tool: &ArchiveTool,
        archive: &Path,
        destination: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<usize> {
        reporter.warn("Trying alternative extraction of individual entries");

        let listing = Mutex::new(String::new());
        let exit = self.run_tool(
            tool,
            tool.list_args(archive),
            cancel,
            &|stream: Stream, line: &str| {
                if stream == Stream::Stdout {
                    let mut listing = listing.lock();
                    listing.push_str(line);
                    listing.push('\n');
                }
            },
        );
        match exit {
            Ok(ProcessExit::Cancelled) => return Err(InstallError::Cancelled),
            Ok(ProcessExit::Exited { .. }) => {}
            Ok(ProcessExit::TimedOut) => {
                reporter.warn("Listing the archive timed out");
                return Ok(0);
            }
            Err(e) => {
                reporter.warn(format!("Listing the archive failed: {}", e));
                return Ok(0);
            }
        }

        let mut entries = tool.parse_listing(&listing.into_inner());
        entries.truncate(self.config.fallback_entry_limit);
        reporter.info(format!("Found {} entries to extract", entries.len()));
        if entries.is_empty() {
            return Ok(0);
        }

        for batch in entries.chunks(SALVAGE_BATCH) {
            let args = tool.extract_entries_args(archive, destination, batch);
            match self.run_tool(tool, args, cancel, &|_: Stream, _: &str| {}) {
                Ok(ProcessExit::Cancelled) => return Err(InstallError::Cancelled),
                Ok(ProcessExit::Exited { status, .. }) if !status.success() => {
                    reporter.debug(format!(
                        "{} entries failed with {}",
                        batch.len(),
                        status
                    ));
                }
                Ok(ProcessExit::Exited { .. }) => {}
                Ok(ProcessExit::TimedOut) => {
                    reporter.warn("Alternative extraction timed out");
                    break;
                }
                Err(e) => {
                    reporter.warn(format!("Alternative extraction failed: {}", e));
                    break;
                }
            }
        }

        Ok(count_tree(destination, None).map(|c| c.files).unwrap_or(0))
    }

    /// Lift a single new top-level directory into `destination`.
    fn flatten(
        &self,
        destination: &Path,
        before: &HashSet<OsString>,
        reporter: &Reporter<'_>,
    ) {
        match flatten_wrapper(destination, before) {
            Ok(Some(wrapper)) => reporter.info(format!(
                "Moved contents of {}/ into {}",
                wrapper,
                destination.display()
            )),
            Ok(None) => {}
            Err(e) => reporter.warn(format!(
                "Could not move wrapper folder contents into {}: {}",
                destination.display(),
                e
            )),
        }
    }

    /// Mark the main executable runnable (Unix only).
    fn mark_executable(&self, destination: &Path, reporter: &Reporter<'_>) {
        let Some(name) = self.config.executable.as_deref() else {
            return;
        };
        let Some(path) = find_file(destination, name) else {
            return;
        };

        match make_executable(&path) {
            Ok(()) => reporter.debug(format!("Marked {} as executable", path.display())),
            Err(e) => reporter.warn(format!(
                "Could not mark {} as executable: {}",
                path.display(),
                e
            )),
        }
    }
}

impl ArchiveExtractor for ToolExtractor {
    fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<ExtractionReport> {
        self.wait_until_readable(archive, cancel, reporter)?;

        // Resolve before creating anything so a missing tool leaves no trace
        let tool = self.resolve_tool()?;
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        fs::create_dir_all(destination)
            .context(|| format!("failed to create {}", destination.display()))?;
        let before = top_level_names(destination)
            .context(|| format!("failed to inspect {}", destination.display()))?;
        reporter.info(format!(
            "Extracting {} with {}",
            archive.display(),
            tool
        ));

        let on_line = |_stream: Stream, line: &str| {
            if let Some(percent) = parse_progress(line) {
                reporter.phase_progress(
                    InstallPhase::Extracting,
                    format!("Extracting... {:.0}%", percent),
                    percent,
                );
            } else {
                reporter.debug(format!("{}: {}", tool.name(), line));
            }
        };

        let mut partial = false;
        match self.run_tool(&tool, tool.extract_args(archive, destination), cancel, &on_line)? {
            ProcessExit::Cancelled => return Err(InstallError::Cancelled),
            ProcessExit::TimedOut => {
                return Err(InstallError::ExtractionFailed {
                    archive: archive.to_path_buf(),
                    reason: format!(
                        "{} did not finish within {}s",
                        tool.name(),
                        self.config.timeout.as_secs()
                    ),
                })
            }
            ProcessExit::Exited { status, .. } if status.success() => {
                reporter.info(format!("{} finished successfully", tool.name()));
            }
            ProcessExit::Exited {
                status,
                stderr_tail,
            } => {
                let reason = format!(
                    "{} exited with {}{}",
                    tool.name(),
                    status,
                    if stderr_tail.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", stderr_tail.join(" | "))
                    }
                );
                reporter.warn(reason.clone());

                let fatal = status.code().is_some_and(|code| tool.is_fatal(code));
                if !fatal {
                    return Err(InstallError::ExtractionFailed {
                        archive: archive.to_path_buf(),
                        reason,
                    });
                }

                let salvaged = self.salvage(&tool, archive, destination, cancel, reporter)?;
                if salvaged == 0 {
                    reporter.warn("Alternative extraction recovered nothing");
                    return Err(InstallError::ExtractionFailed {
                        archive: archive.to_path_buf(),
                        reason,
                    });
                }
                reporter.warn(format!(
                    "Installation is partial: recovered {} files",
                    salvaged
                ));
                partial = true;
            }
        }

        if self.config.flatten_wrapper {
            self.flatten(destination, &before, reporter);
        }

        // Counts the whole tree, so files left from an earlier install also
        // satisfy the check below
        let counts = count_tree(destination, None)
            .context(|| format!("failed to inspect {}", destination.display()))?;
        reporter.info(format!(
            "Extraction finished: {} files, {} directories",
            counts.files, counts.dirs
        ));
        if counts.files == 0 {
            return Err(InstallError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: "the archive produced no files".to_string(),
            });
        }

        self.mark_executable(destination, reporter);

        Ok(ExtractionReport {
            file_count: counts.files,
            dir_count: counts.dirs,
            tool: tool.name().to_string(),
            partial,
        })
    }
}

/// First file named `name` under `dir`, searched breadth-first.
fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut pending = vec![dir.to_path_buf()];
    while !pending.is_empty() {
        let mut next = Vec::new();
        for current in pending {
            let Ok(entries) = fs::read_dir(&current) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    next.push(path);
                } else if entry.file_name() == name {
                    return Some(path);
                }
            }
        }
        pending = next;
    }
    None
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

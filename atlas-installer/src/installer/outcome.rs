//! Terminal results of an installation.

use std::fmt;
use std::path::PathBuf;

use super::error::{ErrorKind, InstallError};

/// States of one "ensure installed" operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallPhase {
    /// Not started.
    Idle,
    /// Consulting the installation probe.
    CheckingExisting,
    /// Running the transfer engine.
    Downloading,
    /// Running the archive extractor.
    Extracting,
    /// Writing the manifest.
    Finalizing,
    /// Finished successfully (or skipped).
    Complete,
    /// Finished with an error.
    Failed,
    /// Cancelled by the user.
    Cancelled,
}

impl InstallPhase {
    /// Get a human-readable name for the phase.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CheckingExisting => "Checking existing installation",
            Self::Downloading => "Downloading",
            Self::Extracting => "Extracting",
            Self::Finalizing => "Finalizing",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Details of a completed installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    /// Destination directory.
    pub install_path: PathBuf,
    /// Files present under the destination after extraction.
    pub file_count: usize,
    /// Bytes on disk when the transfer finished.
    pub bytes_downloaded: u64,
    /// Transfer attempts used.
    pub attempts: u32,
    /// Name of the tool that unpacked the archive.
    pub extraction_tool: String,
    /// Whether the extractor had to fall back to a partial extraction.
    pub partial_extraction: bool,
    /// Desktop shortcut requested by the caller.
    pub desktop_shortcut: bool,
    /// Menu shortcut requested by the caller.
    pub menu_shortcut: bool,
}

/// Why an installation failed, in a form that can be cloned to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    /// Classification of the underlying error.
    pub kind: ErrorKind,
    /// Full error message.
    pub message: String,
    /// Short summary a user can act on.
    pub summary: String,
}

impl From<&InstallError> for FailureReason {
    fn from(err: &InstallError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            summary: err.user_message().to_string(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary, self.message)
    }
}

/// Final result of an "ensure installed" operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Downloaded, extracted, and recorded.
    Completed(InstallSummary),
    /// The destination already held a complete installation.
    AlreadyInstalled,
    /// The operation failed.
    Failed(FailureReason),
    /// The user cancelled the operation.
    Cancelled,
}

impl InstallOutcome {
    /// Whether the destination holds a usable installation.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::AlreadyInstalled)
    }

    /// Files counted after a completed installation.
    pub fn file_count(&self) -> Option<usize> {
        match self {
            Self::Completed(summary) => Some(summary.file_count),
            _ => None,
        }
    }

    /// Error kind of a failed outcome.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed(reason) => Some(reason.kind),
            _ => None,
        }
    }

    /// Phase this outcome terminates in.
    pub fn phase(&self) -> InstallPhase {
        match self {
            Self::Completed(_) | Self::AlreadyInstalled => InstallPhase::Complete,
            Self::Failed(_) => InstallPhase::Failed,
            Self::Cancelled => InstallPhase::Cancelled,
        }
    }
}

impl From<InstallError> for InstallOutcome {
    fn from(err: InstallError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Failed(FailureReason::from(&err))
        }
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(summary) => write!(
                f,
                "installed {} files into {}",
                summary.file_count,
                summary.install_path.display()
            ),
            Self::AlreadyInstalled => write!(f, "already installed"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

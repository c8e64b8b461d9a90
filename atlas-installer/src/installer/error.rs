//! Error types for the installer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Coarse classification of an [`InstallError`].
///
/// Callers (and the retry loop) decide what to do based on the kind rather
/// than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// DNS/connection failures or transient server conditions.
    NetworkUnavailable,
    /// The remote object is missing or moved.
    RemoteNotFound,
    /// The connection dropped mid-stream or produced an empty file.
    TransferIncomplete,
    /// No usable decompression tool was found.
    ExtractionToolMissing,
    /// The tool ran but failed, or produced nothing.
    ExtractionFailed,
    /// The destination volume lacks the required free space.
    InsufficientSpace,
    /// User-initiated cancellation.
    Cancelled,
    /// Anything not classified above.
    Unexpected,
}

impl ErrorKind {
    /// Get a human-readable name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "network unavailable",
            Self::RemoteNotFound => "remote not found",
            Self::TransferIncomplete => "transfer incomplete",
            Self::ExtractionToolMissing => "extraction tool missing",
            Self::ExtractionFailed => "extraction failed",
            Self::InsufficientSpace => "insufficient space",
            Self::Cancelled => "cancelled",
            Self::Unexpected => "unexpected",
        }
    }
}

/// Errors that can occur while ensuring an installation.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Could not reach the source (DNS, refused connection, timeout).
    #[error("could not reach {url}: {reason}")]
    NetworkUnavailable { url: String, reason: String },

    /// The source answered but the object does not exist.
    #[error("source not found at {url} (HTTP {status})")]
    RemoteNotFound { url: String, status: u16 },

    /// The server reported a transient failure (5xx, 408, 429).
    #[error("server at {url} answered HTTP {status}")]
    ServerError { url: String, status: u16 },

    /// The stream ended early or produced an empty file.
    #[error("transfer from {url} incomplete: received {received} bytes{}", expected_suffix(.expected))]
    TransferIncomplete {
        url: String,
        received: u64,
        expected: Option<u64>,
    },

    /// No decompression tool could be located.
    #[error("no extraction tool found (looked for {searched})")]
    ExtractionToolMissing { searched: String },

    /// The decompression tool failed or produced zero entries.
    #[error("failed to extract {}: {reason}", .archive.display())]
    ExtractionFailed { archive: PathBuf, reason: String },

    /// Not enough free space where the installation goes.
    #[error(
        "not enough free space on {}: {available} bytes available, {required} required",
        .path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    /// No transport is registered for the URL scheme.
    #[error("unsupported source {url}")]
    UnsupportedSource { url: String },

    /// Another operation already owns the destination.
    #[error("an installation into {} is already in progress", .path.display())]
    DestinationBusy { path: PathBuf },

    /// A filesystem operation failed.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The operation was cancelled by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// Catch-all for errors that fit no other category.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

fn expected_suffix(expected: &Option<u64>) -> String {
    match expected {
        Some(total) => format!(" of {}", total),
        None => String::new(),
    }
}

impl InstallError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkUnavailable { .. } | Self::ServerError { .. } => {
                ErrorKind::NetworkUnavailable
            }
            Self::RemoteNotFound { .. } => ErrorKind::RemoteNotFound,
            Self::TransferIncomplete { .. } => ErrorKind::TransferIncomplete,
            Self::ExtractionToolMissing { .. } => ErrorKind::ExtractionToolMissing,
            Self::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            Self::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnsupportedSource { .. }
            | Self::DestinationBusy { .. }
            | Self::Io { .. }
            | Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether a fresh download attempt could succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkUnavailable | ErrorKind::TransferIncomplete
        )
    }

    /// Whether this error represents user cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short summary a user can act on.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NetworkUnavailable | ErrorKind::TransferIncomplete => {
                "No internet connection or the download source could not be reached"
            }
            ErrorKind::RemoteNotFound => {
                "The installation file was not found at the configured source"
            }
            ErrorKind::ExtractionToolMissing => {
                "No extraction tool found. Install 7-Zip (https://www.7-zip.org/) or tar"
            }
            ErrorKind::ExtractionFailed => "The downloaded archive could not be extracted",
            ErrorKind::InsufficientSpace => {
                "Not enough free disk space for the installation"
            }
            ErrorKind::Cancelled => "Installation cancelled",
            ErrorKind::Unexpected => "The installation failed unexpectedly",
        }
    }
}

/// Attach context to io-like errors without repeating `map_err` everywhere.
pub(crate) trait ErrContext<T> {
    fn context(self, context: impl FnOnce() -> String) -> InstallResult<T>;
}

impl<T, E: Into<io::Error>> ErrContext<T> for Result<T, E> {
    fn context(self, context: impl FnOnce() -> String) -> InstallResult<T> {
        self.map_err(|err| InstallError::Io {
            context: context(),
            source: err.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_retryable() {
        let err = InstallError::NetworkUnavailable {
            url: "http://example.com/a.tar".to_string(),
            reason: "dns error".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::NetworkUnavailable);

        let err = InstallError::ServerError {
            url: "http://example.com/a.tar".to_string(),
            status: 503,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = InstallError::RemoteNotFound {
            url: "http://example.com/a.tar".to_string(),
            status: 404,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::RemoteNotFound);
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_insufficient_space_is_not_retryable() {
        let err = InstallError::InsufficientSpace {
            path: PathBuf::from("/opt/atlas"),
            available: 1024,
            required: 4096,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::InsufficientSpace);
        assert!(err.to_string().contains("1024 bytes available"));
    }

    #[test]
    fn test_cancelled_is_neither_retryable_nor_unexpected() {
        let err = InstallError::Cancelled;
        assert!(!err.is_retryable());
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_transfer_incomplete_display() {
        let err = InstallError::TransferIncomplete {
            url: "http://x/a.tar".to_string(),
            received: 10,
            expected: Some(100),
        };
        assert_eq!(
            err.to_string(),
            "transfer from http://x/a.tar incomplete: received 10 bytes of 100"
        );

        let err = InstallError::TransferIncomplete {
            url: "http://x/a.tar".to_string(),
            received: 0,
            expected: None,
        };
        assert!(err.to_string().ends_with("received 0 bytes"));
    }

    #[test]
    fn test_user_messages_distinguish_actionable_failures() {
        let messages = [
            InstallError::NetworkUnavailable {
                url: String::new(),
                reason: String::new(),
            }
            .user_message(),
            InstallError::RemoteNotFound {
                url: String::new(),
                status: 404,
            }
            .user_message(),
            InstallError::ExtractionToolMissing {
                searched: "7z".to_string(),
            }
            .user_message(),
            InstallError::ExtractionFailed {
                archive: PathBuf::from("/tmp/a.tar"),
                reason: "exit 2".to_string(),
            }
            .user_message(),
            InstallError::InsufficientSpace {
                path: PathBuf::from("/opt"),
                available: 1,
                required: 2,
            }
            .user_message(),
        ];

        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_err_context() {
        let result: Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = result.context(|| "failed to open /x".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "failed to open /x");
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(std::error::Error::source(&err).is_some());
    }
}

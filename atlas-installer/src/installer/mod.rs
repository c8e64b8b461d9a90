//! Installer core.
//!
//! Makes sure a large application bundle is present in a destination
//! directory: if it is not, the archive is downloaded (resumable, retried
//! with backoff), unpacked with an external tool, and recorded with a
//! manifest. Presentation layers observe the operation through
//! [`InstallEvent`]s and stop it with a [`CancellationToken`].
//!
//! # Workflow
//!
//! ```text
//! CheckingExisting ──(complete)──────────────────────────→ Complete (AlreadyInstalled)
//!        │
//!        ↓
//!   Downloading ──(retryable error, attempts left)──→ backoff ──┐
//!        │   ↑                                                  │
//!        │   └──────────────────────────────────────────────────┘
//!        ↓
//!   Extracting → Finalizing → Complete
//!
//! any phase ──(error)──→ Failed     any phase ──(cancel)──→ Cancelled
//! ```
//!
//! # Progress bands
//!
//! | Phase            | Overall percent |
//! |------------------|-----------------|
//! | CheckingExisting | 0 - 5           |
//! | Downloading      | 5 - 80          |
//! | Extracting       | 80 - 95         |
//! | Finalizing       | 95 - 100        |
//!
//! The overall percent reported for one operation never decreases.
//!
//! # Example
//!
//! ```ignore
//! use atlas_installer::installer::{InstallRequest, Installer, InstallerConfig, TracingReporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let installer = Installer::new(InstallerConfig::default())?;
//! let request = InstallRequest::new("https://mirror.example/atlas.tar", "/opt/Atlas");
//! let outcome = installer.ensure_installed(&request, &CancellationToken::new(), &TracingReporter);
//! ```

mod config;
pub mod download;
mod error;
mod events;
pub mod extract;
mod handle;
mod manifest;
mod orchestrator;
mod outcome;
mod probe;
mod retry;
mod space;
mod traits;

// Orchestration
pub use handle::InstallHandle;
pub use orchestrator::{InstallOptions, InstallRequest, Installer};
pub use outcome::{FailureReason, InstallOutcome, InstallPhase, InstallSummary};

// Configuration
pub use config::{
    ExtractorConfig, InstallerConfig, ProbeConfig, TransferConfig, DEFAULT_ASSUMED_SIZE,
    DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EXTRACT_TIMEOUT, DEFAULT_MARKER_FILES,
    DEFAULT_REQUIRED_FREE_SPACE, DEFAULT_STALL_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT,
};
pub use retry::{wait_or_cancel, Backoff, RetryPolicy};

// Errors
pub use error::{ErrorKind, InstallError, InstallResult};

// Events
pub use events::{
    phase_band, ChannelReporter, InstallEvent, InstallReporter, LogLine, MemoryReporter,
    NullReporter, Reporter, Severity, TracingReporter,
};

// Installation state
pub use manifest::InstallManifest;
pub use probe::{count_tree, InstallationProbe, ProbeReport, TreeCount};

// Extension points
pub use extract::{ExtractionReport, ToolExtractor, ToolKind, ToolLocator};
pub use traits::{ArchiveExtractor, Transport};

pub use tokio_util::sync::CancellationToken;

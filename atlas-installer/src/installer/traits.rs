//! Seams between the orchestrator and its collaborators.
//!
//! The orchestrator only sees these traits, so tests can swap in fakes and
//! new transports or archive tools plug in without touching the state
//! machine.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::download::TransferSession;
use super::error::InstallResult;
use super::events::Reporter;
use super::extract::ExtractionReport;

/// Streams a remote resource into a local file.
pub trait Transport: Send + Sync {
    /// Whether this transport can fetch the given URL.
    fn supports(&self, url: &str) -> bool;

    /// Size of the resource, if the source reports one.
    ///
    /// Failures are not errors here; they just leave the size unknown, and
    /// so does a cancelled token.
    fn probe_size(&self, url: &str, cancel: &CancellationToken) -> Option<u64>;

    /// Run one transfer attempt into `session.destination`.
    ///
    /// Implementations must observe `cancel` while blocked on I/O, not just
    /// between chunks, and must close the destination file before
    /// returning. Returns the number of bytes on disk.
    fn transfer(
        &self,
        session: &mut TransferSession,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<u64>;
}

/// Unpacks a local archive into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `destination`.
    ///
    /// Any spawned process must be gone by the time this returns.
    fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<ExtractionReport>;
}

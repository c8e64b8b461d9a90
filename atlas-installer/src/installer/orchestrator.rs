//! The "ensure installed" operation.
//!
//! This module orchestrates the full installation workflow:
//! 1. Check whether the destination already holds an installation, and
//!    that its volume has room for a new one
//! 2. Download the archive to a unique temporary file, retrying transient
//!    failures with backoff
//! 3. Extract the archive into the destination
//! 4. Write the installation manifest
//! 5. Delete the temporary archive, whatever happened above

use std::collections::HashSet;
use std::env;
use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::InstallerConfig;
use super::download::{format_size, SchemeTransport, TransferSession};
use super::error::{ErrContext, InstallError, InstallResult};
use super::events::{ChannelReporter, InstallReporter, Reporter, Severity};
use super::extract::ToolExtractor;
use super::handle::InstallHandle;
use super::manifest::InstallManifest;
use super::outcome::{InstallOutcome, InstallPhase, InstallSummary};
use super::probe::{InstallationProbe, ProbeReport};
use super::retry::wait_or_cancel;
use super::space::ensure_free_space;
use super::traits::{ArchiveExtractor, Transport};

/// Wait before the second attempt at deleting a temporary archive.
const CLEANUP_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Per-request options supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Total number of transfer attempts (minimum 1).
    pub max_retries: u32,
    /// Whether the caller wants a desktop shortcut.
    pub desktop_shortcut: bool,
    /// Whether the caller wants a start menu entry.
    pub menu_shortcut: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            desktop_shortcut: true,
            menu_shortcut: true,
        }
    }
}

/// What to install, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub source_url: String,
    pub destination: PathBuf,
    pub options: InstallOptions,
}

impl InstallRequest {
    pub fn new(source_url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination: destination.into(),
            options: InstallOptions::default(),
        }
    }

    /// Set the options (builder pattern).
    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the total number of transfer attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }
}

/// Runs "ensure installed" operations.
///
/// Cloning is cheap; clones share the transport, the extractor and the
/// registry of destinations currently being installed into.
#[derive(Clone)]
pub struct Installer {
    config: InstallerConfig,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn ArchiveExtractor>,
    probe: InstallationProbe,
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Installer {
    /// Create an installer with the HTTP/file transports and the tool
    /// extractor.
    pub fn new(config: InstallerConfig) -> InstallResult<Self> {
        let transport = SchemeTransport::new(config.transfer.clone())?;
        let extractor = ToolExtractor::new(config.extractor.clone());
        Ok(Self::with_parts(config, Arc::new(transport), Arc::new(extractor)))
    }

    /// Create an installer from explicit collaborators.
    pub fn with_parts(
        config: InstallerConfig,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        let probe = InstallationProbe::new(config.probe.clone(), config.manifest_file_name());
        Self {
            config,
            transport,
            extractor,
            probe,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn probe(&self) -> &InstallationProbe {
        &self.probe
    }

    /// Make sure `request.destination` holds an installation.
    ///
    /// Runs on the calling thread. Every event goes to `sink`; the last one
    /// is always [`InstallEvent::Done`](super::InstallEvent::Done). The
    /// temporary archive is gone by the time this returns.
    pub fn ensure_installed(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
        sink: &dyn InstallReporter,
    ) -> InstallOutcome {
        let reporter = Reporter::new(sink);

        let outcome = match self.run(request, cancel, &reporter) {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                reporter.info("Installation cancelled");
                InstallOutcome::Cancelled
            }
            Err(err) => {
                reporter.log(Severity::Error, err.user_message());
                reporter.log(Severity::Error, format!("Details: {}", error_chain(&err)));
                InstallOutcome::from(err)
            }
        };

        reporter.phase(outcome.phase());
        reporter.done(&outcome);
        outcome
    }

    /// Run [`ensure_installed`](Self::ensure_installed) on a dedicated
    /// thread.
    pub fn spawn(&self, request: InstallRequest) -> InstallResult<InstallHandle> {
        let (reporter, events) = ChannelReporter::new();
        let cancel = CancellationToken::new();
        let installer = self.clone();
        let token = cancel.clone();

        let thread = thread::Builder::new()
            .name("atlas-install".to_string())
            .spawn(move || installer.ensure_installed(&request, &token, &reporter))
            .context(|| "failed to start installer thread".to_string())?;

        Ok(InstallHandle::new(cancel, events, thread))
    }

    fn run(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<InstallOutcome> {
        let destination = &request.destination;
        let _claim = DestinationClaim::acquire(&self.active, destination)?;

        reporter.phase(InstallPhase::CheckingExisting);
        reporter.info(format!(
            "Checking for an existing installation in {}",
            destination.display()
        ));
        let existing = self.probe.inspect(destination);
        if existing.complete {
            reporter.info(format!(
                "Already installed ({}), nothing to download",
                describe_evidence(&existing, self.config.probe.min_file_count)
            ));
            return Ok(InstallOutcome::AlreadyInstalled);
        }
        if let Some(required) = self.config.required_free_space {
            ensure_free_space(destination, required, reporter)?;
        }
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        let archive = TempArchive::create(&self.config.temp_dir, &self.config.product)?;
        debug!(path = %archive.path().display(), "Allocated temporary archive");

        reporter.phase(InstallPhase::Downloading);
        let (bytes_downloaded, attempts) = self.download(request, archive.path(), cancel, reporter)?;

        // Never start extracting after a cancellation
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        reporter.phase(InstallPhase::Extracting);
        let report = self
            .extractor
            .extract(archive.path(), destination, cancel, reporter)?;
        archive.remove();

        reporter.phase(InstallPhase::Finalizing);
        let summary = InstallSummary {
            install_path: destination.clone(),
            file_count: report.file_count,
            bytes_downloaded,
            attempts,
            extraction_tool: report.tool,
            partial_extraction: report.partial,
            desktop_shortcut: request.options.desktop_shortcut,
            menu_shortcut: request.options.menu_shortcut,
        };

        let manifest =
            InstallManifest::from_summary(self.config.product_version.to_string(), &summary);
        match manifest.write(destination, &self.config.manifest_file_name()) {
            Ok(path) => reporter.info(format!("Wrote {}", path.display())),
            Err(e) => reporter.warn(format!(
                "Could not write the installation manifest: {}",
                error_chain(&e)
            )),
        }

        reporter.info(format!(
            "Installation complete: {} files in {}",
            summary.file_count,
            destination.display()
        ));
        Ok(InstallOutcome::Completed(summary))
    }

    /// Transfer with retries. Returns bytes on disk and attempts used.
    fn download(
        &self,
        request: &InstallRequest,
        archive: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<(u64, u32)> {
        let policy = self
            .config
            .retry
            .clone()
            .with_max_attempts(request.options.max_retries);
        let url = request.source_url.as_str();

        let mut session = TransferSession::new(url, archive);
        session.set_size_hint(self.transport.probe_size(url, cancel));
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        match session.expected_size() {
            Some(size) => reporter.info(format!("Download size: {}", format_size(size))),
            None => reporter.info(format!(
                "Source did not report a size, assuming about {}",
                format_size(self.config.transfer.assumed_size)
            )),
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }
            reporter.info(format!(
                "Download attempt {}/{} from {}",
                attempt, policy.max_attempts, url
            ));

            match self.transport.transfer(&mut session, cancel, reporter) {
                Ok(bytes) => {
                    reporter.info(format!("Download complete: {}", format_size(bytes)));
                    return Ok((bytes, attempt));
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) if err.is_retryable() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_after(attempt);
                    reporter.warn(format!(
                        "Attempt {} failed: {}. Retrying in {}s",
                        attempt,
                        err,
                        delay.as_secs()
                    ));
                    if !wait_or_cancel(delay, cancel) {
                        return Err(InstallError::Cancelled);
                    }
                }
                Err(err) => {
                    reporter.log(
                        Severity::Error,
                        format!("Download failed after {} attempt(s): {}", attempt, err),
                    );
                    return Err(err);
                }
            }
        }
    }
}

fn describe_evidence(report: &ProbeReport, min_file_count: usize) -> String {
    if report.has_manifest {
        "manifest present".to_string()
    } else if let Some(marker) = &report.marker {
        format!("found {}", marker)
    } else {
        format!("more than {} files present", min_file_count)
    }
}

/// Render an error with its whole source chain.
fn error_chain(err: &InstallError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Exclusive claim on a destination for the lifetime of one operation.
struct DestinationClaim {
    active: Arc<Mutex<HashSet<PathBuf>>>,
    key: PathBuf,
}

impl DestinationClaim {
    fn acquire(active: &Arc<Mutex<HashSet<PathBuf>>>, destination: &Path) -> InstallResult<Self> {
        let key = if destination.is_absolute() {
            destination.to_path_buf()
        } else {
            env::current_dir()
                .map(|cwd| cwd.join(destination))
                .unwrap_or_else(|_| destination.to_path_buf())
        };

        if !active.lock().insert(key.clone()) {
            return Err(InstallError::DestinationBusy {
                path: destination.to_path_buf(),
            });
        }
        Ok(Self {
            active: Arc::clone(active),
            key,
        })
    }
}

impl Drop for DestinationClaim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

/// Uniquely named temporary archive, deleted on drop.
struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    fn create(temp_dir: &Path, product: &str) -> InstallResult<Self> {
        fs::create_dir_all(temp_dir)
            .context(|| format!("failed to create {}", temp_dir.display()))?;
        let name = format!("{}_{}.tar", product, Uuid::new_v4().simple());
        Ok(Self {
            path: temp_dir.join(name),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file, retrying once if the OS still holds it.
    fn remove(&self) {
        if !self.path.exists() {
            return;
        }
        if fs::remove_file(&self.path).is_ok() {
            debug!(path = %self.path.display(), "Removed temporary archive");
            return;
        }
        thread::sleep(CLEANUP_RETRY_DELAY);
        if let Err(e) = fs::remove_file(&self.path) {
            if self.path.exists() {
                warn!(path = %self.path.display(), error = %e, "Could not remove temporary archive");
            }
        }
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::error::ErrorKind;
    use crate::installer::events::{InstallEvent, MemoryReporter, NullReporter};
    use crate::installer::extract::ExtractionReport;
    use crate::installer::retry::{Backoff, RetryPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Transport that fails a fixed number of times, then writes `payload`.
    struct FakeTransport {
        failures: u32,
        error: fn(&str) -> InstallError,
        payload: Vec<u8>,
        calls: AtomicU32,
        cancel_on_call: Option<CancellationToken>,
    }

    impl FakeTransport {
        fn succeeding() -> Self {
            Self {
                failures: 0,
                error: connection_reset,
                payload: vec![1u8; 1024],
                calls: AtomicU32::new(0),
                cancel_on_call: None,
            }
        }

        fn failing(failures: u32, error: fn(&str) -> InstallError) -> Self {
            Self {
                failures,
                error,
                ..Self::succeeding()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn connection_reset(url: &str) -> InstallError {
        InstallError::NetworkUnavailable {
            url: url.to_string(),
            reason: "connection reset".to_string(),
        }
    }

    fn not_found(url: &str) -> InstallError {
        InstallError::RemoteNotFound {
            url: url.to_string(),
            status: 404,
        }
    }

    impl Transport for FakeTransport {
        fn supports(&self, _url: &str) -> bool {
            true
        }

        fn probe_size(&self, _url: &str, _cancel: &CancellationToken) -> Option<u64> {
            None
        }

        fn transfer(
            &self,
            session: &mut TransferSession,
            cancel: &CancellationToken,
            _reporter: &Reporter<'_>,
        ) -> InstallResult<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Leave a partial file behind like a dropped connection would
            fs::write(session.destination(), &self.payload[..10]).unwrap();
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            if cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }
            if call <= self.failures {
                return Err((self.error)(&session.url));
            }
            fs::write(session.destination(), &self.payload).unwrap();
            Ok(self.payload.len() as u64)
        }
    }

    /// Extractor that writes `files` files, or fails with a fixed error.
    struct FakeExtractor {
        files: usize,
        error: Option<fn() -> InstallError>,
        seen_archive: Mutex<Option<PathBuf>>,
        cancel_midway: Option<CancellationToken>,
    }

    impl FakeExtractor {
        fn writing(files: usize) -> Self {
            Self {
                files,
                error: None,
                seen_archive: Mutex::new(None),
                cancel_midway: None,
            }
        }

        fn failing(error: fn() -> InstallError) -> Self {
            Self {
                error: Some(error),
                ..Self::writing(0)
            }
        }
    }

    impl ArchiveExtractor for FakeExtractor {
        fn extract(
            &self,
            archive: &Path,
            destination: &Path,
            cancel: &CancellationToken,
            _reporter: &Reporter<'_>,
        ) -> InstallResult<ExtractionReport> {
            *self.seen_archive.lock() = Some(archive.to_path_buf());
            assert!(archive.is_file(), "archive must exist before extraction");
            if let Some(error) = self.error {
                return Err(error());
            }
            fs::create_dir_all(destination).unwrap();
            for i in 0..self.files {
                fs::write(destination.join(format!("file{}.bin", i)), b"x").unwrap();
                // A supervised tool is killed as soon as the token fires
                if i == 0 {
                    if let Some(token) = &self.cancel_midway {
                        token.cancel();
                    }
                }
                if cancel.is_cancelled() {
                    return Err(InstallError::Cancelled);
                }
            }
            Ok(ExtractionReport {
                file_count: self.files,
                dir_count: 0,
                tool: "fake".to_string(),
                partial: false,
            })
        }
    }

    struct Fixture {
        temp: TempDir,
        transport: Arc<FakeTransport>,
        extractor: Arc<FakeExtractor>,
        installer: Installer,
    }

    impl Fixture {
        fn new(transport: FakeTransport, extractor: FakeExtractor) -> Self {
            let temp = TempDir::new().unwrap();
            let config = InstallerConfig::default()
                .with_temp_dir(temp.path().join("tmp"))
                .with_retry(RetryPolicy::new(3, Backoff::None))
                .with_required_free_space(None);
            let transport = Arc::new(transport);
            let extractor = Arc::new(extractor);
            let installer = Installer::with_parts(config, transport.clone(), extractor.clone());
            Self {
                temp,
                transport,
                extractor,
                installer,
            }
        }

        fn destination(&self) -> PathBuf {
            self.temp.path().join("Atlas")
        }

        fn request(&self) -> InstallRequest {
            InstallRequest::new("http://mirror.test/atlas.tar", self.destination())
        }

        fn temp_files(&self) -> usize {
            fs::read_dir(self.temp.path().join("tmp"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    #[test]
    fn test_happy_path() {
        let fx = Fixture::new(FakeTransport::succeeding(), FakeExtractor::writing(10));
        let memory = MemoryReporter::new();

        let outcome =
            fx.installer
                .ensure_installed(&fx.request(), &CancellationToken::new(), &memory);

        assert_eq!(outcome.file_count(), Some(10));
        assert!(fx.destination().join(".atlas_version.json").is_file());
        assert_eq!(fx.temp_files(), 0);
        assert_eq!(
            memory.phases(),
            vec![
                InstallPhase::CheckingExisting,
                InstallPhase::Downloading,
                InstallPhase::Extracting,
                InstallPhase::Finalizing,
                InstallPhase::Complete,
            ]
        );
        assert_eq!(memory.outcome(), Some(outcome));

        let percents = memory.percents();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100.0));
    }

    #[test]
    fn test_temp_archive_name_is_unique() {
        let fx = Fixture::new(FakeTransport::succeeding(), FakeExtractor::writing(10));
        fx.installer
            .ensure_installed(&fx.request(), &CancellationToken::new(), &NullReporter);

        let seen = fx.extractor.seen_archive.lock().clone().unwrap();
        let name = seen.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("atlas_"));
        assert!(name.ends_with(".tar"));
        assert_eq!(name.len(), "atlas_".len() + 32 + ".tar".len());
    }

    #[test]
    fn test_already_installed_skips_network() {
        let fx = Fixture::new(FakeTransport::succeeding(), FakeExtractor::writing(10));
        let cancel = CancellationToken::new();

        let first = fx.installer.ensure_installed(&fx.request(), &cancel, &NullReporter);
        assert!(matches!(first, InstallOutcome::Completed(_)));
        assert_eq!(fx.transport.calls(), 1);

        let second = fx.installer.ensure_installed(&fx.request(), &cancel, &NullReporter);
        assert_eq!(second, InstallOutcome::AlreadyInstalled);
        assert_eq!(fx.transport.calls(), 1);
    }

    #[test]
    fn test_retry_bound() {
        let fx = Fixture::new(
            FakeTransport::failing(u32::MAX, connection_reset),
            FakeExtractor::writing(10),
        );
        let request = fx.request().with_max_retries(4);

        let outcome = fx
            .installer
            .ensure_installed(&request, &CancellationToken::new(), &NullReporter);

        assert_eq!(outcome.failure_kind(), Some(ErrorKind::NetworkUnavailable));
        assert_eq!(fx.transport.calls(), 4);
        assert_eq!(fx.temp_files(), 0);
        assert!(fx.extractor.seen_archive.lock().is_none());
    }

    #[test]
    fn test_flaky_network_then_success() {
        let fx = Fixture::new(
            FakeTransport::failing(2, connection_reset),
            FakeExtractor::writing(10),
        );
        let memory = MemoryReporter::new();

        let outcome = fx
            .installer
            .ensure_installed(&fx.request(), &CancellationToken::new(), &memory);

        match outcome {
            InstallOutcome::Completed(summary) => assert_eq!(summary.attempts, 3),
            other => panic!("unexpected outcome: {}", other),
        }
        assert_eq!(fx.transport.calls(), 3);
        let attempts = memory
            .log_messages()
            .into_iter()
            .filter(|m| m.starts_with("Download attempt"))
            .count();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let fx = Fixture::new(
            FakeTransport::failing(u32::MAX, not_found),
            FakeExtractor::writing(10),
        );

        let outcome =
            fx.installer
                .ensure_installed(&fx.request(), &CancellationToken::new(), &NullReporter);

        assert_eq!(outcome.failure_kind(), Some(ErrorKind::RemoteNotFound));
        assert_eq!(fx.transport.calls(), 1);
        assert_eq!(fx.temp_files(), 0);
    }

    #[test]
    fn test_cancel_during_transfer() {
        let cancel = CancellationToken::new();
        let mut transport = FakeTransport::succeeding();
        transport.cancel_on_call = Some(cancel.clone());
        let fx = Fixture::new(transport, FakeExtractor::writing(10));
        let memory = MemoryReporter::new();

        let outcome = fx.installer.ensure_installed(&fx.request(), &cancel, &memory);

        assert_eq!(outcome, InstallOutcome::Cancelled);
        assert_eq!(fx.transport.calls(), 1);
        assert_eq!(fx.temp_files(), 0);
        assert!(fx.extractor.seen_archive.lock().is_none());
        assert_eq!(memory.phases().last(), Some(&InstallPhase::Cancelled));
    }

    #[test]
    fn test_cancel_during_backoff() {
        let temp = TempDir::new().unwrap();
        let config = InstallerConfig::default()
            .with_temp_dir(temp.path())
            .with_retry(RetryPolicy::new(5, Backoff::Linear(Duration::from_secs(60))))
            .with_required_free_space(None);
        let transport = Arc::new(FakeTransport::failing(u32::MAX, connection_reset));
        let installer = Installer::with_parts(
            config,
            transport.clone(),
            Arc::new(FakeExtractor::writing(1)),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let outcome = installer.ensure_installed(
            &InstallRequest::new("http://x/a.tar", temp.path().join("dest")).with_max_retries(5),
            &cancel,
            &NullReporter,
        );
        canceller.join().unwrap();

        assert_eq!(outcome, InstallOutcome::Cancelled);
        assert_eq!(transport.calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancel_during_extraction() {
        let cancel = CancellationToken::new();
        let mut extractor = FakeExtractor::writing(10);
        extractor.cancel_midway = Some(cancel.clone());
        let fx = Fixture::new(FakeTransport::succeeding(), extractor);
        let memory = MemoryReporter::new();

        let outcome = fx.installer.ensure_installed(&fx.request(), &cancel, &memory);

        assert_eq!(outcome, InstallOutcome::Cancelled);
        assert!(fx.extractor.seen_archive.lock().is_some());
        assert_eq!(fx.temp_files(), 0);
        let phases = memory.phases();
        assert!(phases.contains(&InstallPhase::Extracting));
        assert!(!phases.contains(&InstallPhase::Finalizing));
        assert_eq!(phases.last(), Some(&InstallPhase::Cancelled));
        assert!(!fx.destination().join(".atlas_version.json").exists());
    }

    #[test]
    fn test_insufficient_space_stops_before_download() {
        let temp = TempDir::new().unwrap();
        let config = InstallerConfig::default()
            .with_temp_dir(temp.path().join("tmp"))
            .with_required_free_space(Some(u64::MAX));
        let transport = Arc::new(FakeTransport::succeeding());
        let installer = Installer::with_parts(
            config,
            transport.clone(),
            Arc::new(FakeExtractor::writing(1)),
        );
        let destination = temp.path().join("Atlas");
        let memory = MemoryReporter::new();

        let outcome = installer.ensure_installed(
            &InstallRequest::new("http://mirror.test/atlas.tar", destination.clone()),
            &CancellationToken::new(),
            &memory,
        );

        assert_eq!(outcome.failure_kind(), Some(ErrorKind::InsufficientSpace));
        assert_eq!(transport.calls(), 0);
        assert!(!destination.exists());
        assert!(!temp.path().join("tmp").exists());
        assert!(!memory.phases().contains(&InstallPhase::Downloading));
    }

    #[test]
    fn test_extraction_failure_cleans_up() {
        let fx = Fixture::new(
            FakeTransport::succeeding(),
            FakeExtractor::failing(|| InstallError::ExtractionToolMissing {
                searched: "7-Zip, tar".to_string(),
            }),
        );

        let outcome =
            fx.installer
                .ensure_installed(&fx.request(), &CancellationToken::new(), &NullReporter);

        assert_eq!(outcome.failure_kind(), Some(ErrorKind::ExtractionToolMissing));
        assert_eq!(fx.temp_files(), 0);
        assert!(!fx.destination().exists());
    }

    #[test]
    fn test_destination_busy() {
        let fx = Fixture::new(FakeTransport::succeeding(), FakeExtractor::writing(10));
        let claim = DestinationClaim::acquire(&fx.installer.active, &fx.destination()).unwrap();

        let outcome =
            fx.installer
                .ensure_installed(&fx.request(), &CancellationToken::new(), &NullReporter);
        assert!(matches!(outcome, InstallOutcome::Failed(_)));
        assert_eq!(fx.transport.calls(), 0);

        drop(claim);
        let outcome =
            fx.installer
                .ensure_installed(&fx.request(), &CancellationToken::new(), &NullReporter);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_failure_reports_user_message() {
        let fx = Fixture::new(
            FakeTransport::failing(u32::MAX, not_found),
            FakeExtractor::writing(10),
        );
        let memory = MemoryReporter::new();

        fx.installer
            .ensure_installed(&fx.request(), &CancellationToken::new(), &memory);

        assert!(memory
            .log_messages()
            .iter()
            .any(|m| m.contains("was not found")));
        assert!(matches!(
            memory.events().last(),
            Some(InstallEvent::Done(InstallOutcome::Failed(_)))
        ));
    }

    #[test]
    fn test_spawn_and_join() {
        let fx = Fixture::new(FakeTransport::succeeding(), FakeExtractor::writing(10));
        let mut handle = fx.installer.spawn(fx.request()).unwrap();

        let mut phases = Vec::new();
        while let Some(event) = handle.events().blocking_recv() {
            match event {
                InstallEvent::Phase(phase) => phases.push(phase),
                InstallEvent::Done(outcome) => {
                    assert!(outcome.is_success());
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(phases.last(), Some(&InstallPhase::Complete));

        let outcome = handle.join();
        assert!(outcome.is_success());
    }
}

//! Integration tests for the "ensure installed" operation.
//!
//! These tests drive the real HTTP transport against a local mock server
//! and the real extractor against the system `tar`:
//! - Fresh install: download → extract → manifest → temp cleanup
//! - Idempotency: a second run makes no network requests
//! - Failure classification for missing sources and missing tools
//! - Zero-entry archives and cancellation
//!
//! Tests that need `tar` return early when it is not installed.
//!
//! Run with: `cargo test --test ensure_installed_integration`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use atlas_installer::installer::download::SchemeTransport;
use atlas_installer::installer::{
    Backoff, CancellationToken, ErrorKind, ExtractorConfig, InstallEvent, InstallManifest,
    InstallOutcome, InstallPhase, InstallRequest, Installer, InstallerConfig, MemoryReporter,
    NullReporter, RetryPolicy, ToolExtractor, ToolKind, ToolLocator,
};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn tar_available() -> bool {
    ToolLocator::new().locate(ToolKind::Tar).is_some()
}

/// Build a tar archive holding `count` files of random bytes, packed inside
/// a versioned wrapper folder the way releases are published.
fn make_archive(root: &Path, count: usize) -> Vec<u8> {
    let staging = root.join("staging");
    let resources = staging.join("Atlas_Interactivo-1.0.0").join("resources");
    fs::create_dir_all(&resources).unwrap();
    for i in 0..count {
        let payload: Vec<u8> = (0..2048).map(|_| rand::random::<u8>()).collect();
        fs::write(resources.join(format!("chunk{:02}.bin", i)), payload).unwrap();
    }

    let archive = root.join("source.tar");
    let status = Command::new("tar")
        .arg("-cf")
        .arg(&archive)
        .arg("-C")
        .arg(&staging)
        .arg(".")
        .status()
        .unwrap();
    assert!(status.success());
    fs::read(archive).unwrap()
}

/// Build a valid tar archive with no entries.
fn make_empty_archive(root: &Path) -> Vec<u8> {
    let staging = root.join("empty");
    fs::create_dir_all(&staging).unwrap();
    let archive = root.join("empty.tar");
    let status = Command::new("tar")
        .arg("-cf")
        .arg(&archive)
        .arg("-C")
        .arg(&staging)
        .arg("--files-from")
        .arg("/dev/null")
        .status()
        .unwrap();
    assert!(status.success());
    fs::read(archive).unwrap()
}

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn temp_dir(&self) -> PathBuf {
        self.root().join("tmp")
    }

    fn destination(&self) -> PathBuf {
        self.root().join("AtlasInteractivo")
    }

    fn config(&self) -> InstallerConfig {
        InstallerConfig::default()
            .with_temp_dir(self.temp_dir())
            .with_retry(RetryPolicy::new(3, Backoff::None))
            .with_required_free_space(None)
            .with_extractor(ExtractorConfig {
                preference: vec![ToolKind::Tar],
                ..Default::default()
            })
    }

    fn installer(&self) -> Installer {
        Installer::new(self.config()).unwrap()
    }

    fn leftover_temp_files(&self) -> usize {
        fs::read_dir(self.temp_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_fresh_install_from_http() {
    if !tar_available() {
        return;
    }
    let ws = Workspace::new();
    let body = make_archive(ws.root(), 10);

    let mut server = mockito::Server::new();
    let get = server
        .mock("GET", "/Atlas_Interactivo.tar")
        .with_status(200)
        .with_header("content-length", &body.len().to_string())
        .with_body(&body)
        .expect(1)
        .create();

    let request = InstallRequest::new(
        format!("{}/Atlas_Interactivo.tar", server.url()),
        ws.destination(),
    );
    let memory = MemoryReporter::new();
    let outcome = ws
        .installer()
        .ensure_installed(&request, &CancellationToken::new(), &memory);

    get.assert();
    let summary = match outcome {
        InstallOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome: {}", other),
    };
    assert_eq!(summary.file_count, 10);
    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.bytes_downloaded, body.len() as u64);
    assert_eq!(summary.extraction_tool, "tar");

    assert!(ws
        .destination()
        .join("resources")
        .join("chunk09.bin")
        .is_file());
    assert!(!ws.destination().join("Atlas_Interactivo-1.0.0").exists());

    let manifest =
        InstallManifest::load(&ws.destination().join(".atlas_version.json")).unwrap();
    assert!(manifest.installed);
    assert_eq!(manifest.total_files, 10);
    assert_eq!(manifest.install_path, ws.destination());

    assert_eq!(ws.leftover_temp_files(), 0);

    let percents = memory.percents();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100.0));
    assert!(memory
        .events()
        .iter()
        .any(|event| matches!(event, InstallEvent::Transfer(_))));
}

#[test]
fn test_second_run_is_idempotent() {
    if !tar_available() {
        return;
    }
    let ws = Workspace::new();
    let body = make_archive(ws.root(), 10);
    let installer = ws.installer();

    let mut server = mockito::Server::new();
    let url = format!("{}/Atlas_Interactivo.tar", server.url());
    let request = InstallRequest::new(url, ws.destination());

    {
        let _first = server
            .mock("GET", "/Atlas_Interactivo.tar")
            .with_status(200)
            .with_body(&body)
            .create();
        let outcome = installer.ensure_installed(&request, &CancellationToken::new(), &NullReporter);
        assert!(matches!(outcome, InstallOutcome::Completed(_)));
    }

    let get = server
        .mock("GET", "/Atlas_Interactivo.tar")
        .with_status(200)
        .with_body(&body)
        .expect(0)
        .create();
    let head = server
        .mock("HEAD", "/Atlas_Interactivo.tar")
        .expect(0)
        .create();

    let memory = MemoryReporter::new();
    let outcome = installer.ensure_installed(&request, &CancellationToken::new(), &memory);

    assert_eq!(outcome, InstallOutcome::AlreadyInstalled);
    assert_eq!(
        memory.phases(),
        vec![InstallPhase::CheckingExisting, InstallPhase::Complete]
    );
    get.assert();
    head.assert();
}

#[test]
fn test_missing_source_fails_without_retry() {
    let ws = Workspace::new();
    let mut server = mockito::Server::new();
    let get = server
        .mock("GET", "/missing.tar")
        .with_status(404)
        .expect(1)
        .create();

    let request = InstallRequest::new(format!("{}/missing.tar", server.url()), ws.destination())
        .with_max_retries(5);
    let memory = MemoryReporter::new();
    let outcome = ws
        .installer()
        .ensure_installed(&request, &CancellationToken::new(), &memory);

    get.assert();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::RemoteNotFound));
    assert_eq!(ws.leftover_temp_files(), 0);
    assert!(!ws.destination().exists());
    assert_eq!(memory.phases().last(), Some(&InstallPhase::Failed));
}

#[test]
fn test_server_errors_are_retried_until_exhausted() {
    let ws = Workspace::new();
    let mut server = mockito::Server::new();
    let get = server
        .mock("GET", "/atlas.tar")
        .with_status(503)
        .expect(3)
        .create();

    let request = InstallRequest::new(format!("{}/atlas.tar", server.url()), ws.destination())
        .with_max_retries(3);
    let outcome = ws
        .installer()
        .ensure_installed(&request, &CancellationToken::new(), &NullReporter);

    get.assert();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::NetworkUnavailable));
    assert_eq!(ws.leftover_temp_files(), 0);
}

#[test]
fn test_missing_tool_fails_before_creating_destination() {
    let ws = Workspace::new();
    let mut server = mockito::Server::new();
    let _get = server
        .mock("GET", "/atlas.tar")
        .with_status(200)
        .with_body(vec![0u8; 4096])
        .create();

    let config = ws.config();
    let transport = SchemeTransport::new(config.transfer.clone()).unwrap();
    let extractor = ToolExtractor::new(config.extractor.clone())
        .with_locator(ToolLocator::with_search_path(""));
    let installer = Installer::with_parts(config, Arc::new(transport), Arc::new(extractor));

    let request = InstallRequest::new(format!("{}/atlas.tar", server.url()), ws.destination());
    let outcome = installer.ensure_installed(&request, &CancellationToken::new(), &NullReporter);

    assert_eq!(outcome.failure_kind(), Some(ErrorKind::ExtractionToolMissing));
    assert!(!ws.destination().exists());
    assert_eq!(ws.leftover_temp_files(), 0);
}

#[test]
fn test_empty_archive_is_extraction_failure() {
    if !tar_available() {
        return;
    }
    let ws = Workspace::new();
    let body = make_empty_archive(ws.root());

    let mut server = mockito::Server::new();
    let _get = server
        .mock("GET", "/atlas.tar")
        .with_status(200)
        .with_body(&body)
        .create();

    let request = InstallRequest::new(format!("{}/atlas.tar", server.url()), ws.destination());
    let outcome = ws
        .installer()
        .ensure_installed(&request, &CancellationToken::new(), &NullReporter);

    assert_eq!(outcome.failure_kind(), Some(ErrorKind::ExtractionFailed));
    assert!(!ws.destination().join(".atlas_version.json").exists());
    assert_eq!(ws.leftover_temp_files(), 0);
}

#[test]
fn test_cancelled_before_download() {
    let ws = Workspace::new();
    let mut server = mockito::Server::new();
    let get = server.mock("GET", "/atlas.tar").expect(0).create();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = InstallRequest::new(format!("{}/atlas.tar", server.url()), ws.destination());
    let memory = MemoryReporter::new();
    let outcome = ws.installer().ensure_installed(&request, &cancel, &memory);

    get.assert();
    assert_eq!(outcome, InstallOutcome::Cancelled);
    assert_eq!(memory.outcome(), Some(InstallOutcome::Cancelled));
    assert_eq!(ws.leftover_temp_files(), 0);
}

#[test]
fn test_install_from_local_file() {
    if !tar_available() {
        return;
    }
    let ws = Workspace::new();
    let body = make_archive(ws.root(), 8);
    let mirror = ws.root().join("mirror.tar");
    fs::write(&mirror, &body).unwrap();

    let url = format!("file://{}", mirror.display());
    let request = InstallRequest::new(url, ws.destination());
    let outcome = ws
        .installer()
        .ensure_installed(&request, &CancellationToken::new(), &NullReporter);

    assert_eq!(outcome.file_count(), Some(8));
    assert!(mirror.is_file(), "source must not be consumed");
    assert_eq!(ws.leftover_temp_files(), 0);
}

#[test]
fn test_spawned_install_streams_events() {
    if !tar_available() {
        return;
    }
    let ws = Workspace::new();
    let body = make_archive(ws.root(), 6);

    let mut server = mockito::Server::new();
    let _get = server
        .mock("GET", "/atlas.tar")
        .with_status(200)
        .with_body(&body)
        .create();

    let request = InstallRequest::new(format!("{}/atlas.tar", server.url()), ws.destination());
    let mut handle = ws.installer().spawn(request).unwrap();

    let mut logs = 0;
    let mut done = None;
    while let Some(event) = handle.events().blocking_recv() {
        match event {
            InstallEvent::Log(_) => logs += 1,
            InstallEvent::Done(outcome) => {
                done = Some(outcome);
                break;
            }
            _ => {}
        }
    }

    let outcome = handle.join();
    assert!(logs > 0);
    assert_eq!(done, Some(outcome.clone()));
    assert_eq!(outcome.file_count(), Some(6));
}

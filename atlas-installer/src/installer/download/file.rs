//! `file://` transport for local mirrors and offline installs.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;

use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::progress::{format_size, ProgressTracker};
use super::session::TransferSession;
use super::stream::copy_to_file;
use crate::installer::config::TransferConfig;
use crate::installer::error::{ErrContext, InstallError, InstallResult};
use crate::installer::events::Reporter;
use crate::installer::traits::Transport;

/// Copies an archive from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileTransport {
    config: TransferConfig,
}

impl FileTransport {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    fn source_path(url: &str) -> InstallResult<PathBuf> {
        Url::parse(url)
            .ok()
            .filter(|parsed| parsed.scheme() == "file")
            .and_then(|parsed| parsed.to_file_path().ok())
            .ok_or_else(|| InstallError::UnsupportedSource {
                url: url.to_string(),
            })
    }
}

impl Transport for FileTransport {
    fn supports(&self, url: &str) -> bool {
        url.to_ascii_lowercase().starts_with("file://")
    }

    fn probe_size(&self, url: &str, cancel: &CancellationToken) -> Option<u64> {
        if cancel.is_cancelled() {
            return None;
        }
        let path = Self::source_path(url).ok()?;
        fs::metadata(path).ok().map(|m| m.len())
    }

    fn transfer(
        &self,
        session: &mut TransferSession,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<u64> {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        let source_path = Self::source_path(&session.url)?;
        let mut source = File::open(&source_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => InstallError::RemoteNotFound {
                url: session.url.clone(),
                status: 404,
            },
            _ => InstallError::Io {
                context: format!("failed to open {}", source_path.display()),
                source: e,
            },
        })?;
        let total = source
            .metadata()
            .context(|| format!("failed to stat {}", source_path.display()))?
            .len();
        session.set_total_size(total);

        let existing = fs::metadata(session.destination())
            .map(|m| m.len())
            .unwrap_or(0);
        let start = if self.config.resume && existing > 0 && existing <= total {
            existing
        } else {
            0
        };

        let file = if start > 0 {
            reporter.info(format!("Resuming copy at {}", format_size(start)));
            source
                .seek(SeekFrom::Start(start))
                .context(|| format!("failed to seek {}", source_path.display()))?;
            let mut file = OpenOptions::new()
                .write(true)
                .open(session.destination())
                .context(|| format!("failed to open {}", session.destination().display()))?;
            file.seek(SeekFrom::End(0))
                .context(|| format!("failed to seek {}", session.destination().display()))?;
            file
        } else {
            File::create(session.destination())
                .context(|| format!("failed to create {}", session.destination().display()))?
        };

        session.begin_attempt(start);
        let mut tracker = ProgressTracker::new(
            Some(total),
            self.config.assumed_size,
            start,
            self.config.progress_interval,
            Instant::now(),
        );

        copy_to_file(
            &mut source,
            file,
            session,
            &mut tracker,
            self.config.chunk_size,
            cancel,
            reporter,
        )
    }
}

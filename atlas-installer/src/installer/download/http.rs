//! HTTP(S) transport with range-request resume.
//!
//! Each attempt is a fresh GET. When the temporary file already holds a
//! prefix from an earlier attempt of the same operation, the request carries
//! `Range: bytes=N-` and the server's answer decides what happens:
//!
//! - `206 Partial Content` appends at the `Content-Range` start
//! - `200 OK` rewrites the file from the beginning
//! - `416 Range Not Satisfiable` means the prefix is either the whole
//!   resource (done) or garbage (discarded, full request follows)

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::time::Instant;

use reqwest::blocking::{Client, Response};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::partial::{content_length, content_range_total, response_range_start};
use super::progress::{format_size, ProgressTracker};
use super::session::TransferSession;
use super::stream::copy_to_file;
use super::watch::{run_interruptible, Interrupted, PipedReader};
use crate::installer::config::TransferConfig;
use crate::installer::error::{ErrContext, InstallError, InstallResult};
use crate::installer::events::Reporter;
use crate::installer::traits::Transport;

/// Maximum number of redirects followed.
const MAX_REDIRECTS: usize = 10;

/// HTTP(S) transport backed by a blocking `reqwest` client.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    config: TransferConfig,
}

impl HttpTransport {
    /// Create a transport with the given settings.
    pub fn new(config: TransferConfig) -> InstallResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| InstallError::Unexpected(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Issue the GET, giving up when the token fires or no response
    /// arrives within the stall timeout.
    fn send(&self, url: &str, offset: u64, cancel: &CancellationToken) -> InstallResult<Response> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", offset));
        }
        run_interruptible("atlas-http", self.config.stall_timeout, cancel, move || {
            request.send()
        })
        .map_err(|interrupted| self.interrupted(url, interrupted))?
        .map_err(|e| classify_request_error(url, e))
    }

    fn interrupted(&self, url: &str, interrupted: Interrupted) -> InstallError {
        match interrupted {
            Interrupted::Cancelled => InstallError::Cancelled,
            Interrupted::TimedOut => InstallError::NetworkUnavailable {
                url: url.to_string(),
                reason: format!(
                    "no response within {}s",
                    self.config.stall_timeout.as_secs()
                ),
            },
            Interrupted::Worker(source) => InstallError::Io {
                context: "failed to start HTTP request".to_string(),
                source,
            },
        }
    }

    /// Handle `416` to a resume request.
    ///
    /// Returns `Some(bytes)` when the partial file is already the whole
    /// resource, otherwise discards it.
    fn settle_unsatisfiable_range(
        &self,
        response: &Response,
        session: &mut TransferSession,
        offset: u64,
        reporter: &Reporter<'_>,
    ) -> InstallResult<Option<u64>> {
        let total = content_range_total(response.headers()).or(session.expected_size());
        if total == Some(offset) {
            session.set_total_size(offset);
            session.begin_attempt(offset);
            reporter.info(format!(
                "Archive already fully downloaded ({})",
                format_size(offset)
            ));
            return Ok(Some(offset));
        }

        reporter.warn("Server rejected the resume request, restarting download");
        remove_partial(session.destination())?;
        Ok(None)
    }
}

impl Transport for HttpTransport {
    fn supports(&self, url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        url.starts_with("http://") || url.starts_with("https://")
    }

    fn probe_size(&self, url: &str, cancel: &CancellationToken) -> Option<u64> {
        let limit = self.config.stall_timeout;
        let request = self.client.head(url).timeout(limit);
        match run_interruptible("atlas-http-head", limit, cancel, move || request.send()) {
            Ok(Ok(response)) if response.status().is_success() => {
                content_length(response.headers())
            }
            Ok(Ok(response)) => {
                debug!(url, status = response.status().as_u16(), "HEAD probe rejected");
                None
            }
            Ok(Err(e)) => {
                debug!(url, error = %e, "HEAD probe failed");
                None
            }
            Err(interrupted) => {
                debug!(url, reason = ?interrupted, "HEAD request abandoned");
                None
            }
        }
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

        let url = session.url.clone();
        let mut offset = if self.config.resume {
            partial_len(session.destination())
        } else {
            0
        };

        if offset > 0 {
            reporter.info(format!(
                "Resuming download at {}",
                format_size(offset)
            ));
        }

        let mut response = self.send(&url, offset, cancel)?;

        if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            if let Some(bytes) =
                self.settle_unsatisfiable_range(&response, session, offset, reporter)?
            {
                return Ok(bytes);
            }
            offset = 0;
            response = self.send(&url, offset, cancel)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(&url, status));
        }

        let start = response_range_start(status, response.headers())
            .map_err(|e| InstallError::Unexpected(format!("{}: {}", url, e)))?;
        if start > offset {
            return Err(InstallError::Unexpected(format!(
                "{} resumed at byte {} but only {} bytes are on disk",
                url, start, offset
            )));
        }
        if offset > 0 && start == 0 {
            reporter.warn("Server does not support resume, restarting download");
        }

        let total = if status == StatusCode::PARTIAL_CONTENT {
            content_range_total(response.headers())
        } else {
            None
        }
        .or_else(|| content_length(response.headers()).map(|len| len + start));
        if let Some(total) = total {
            session.set_total_size(total);
        }

        session.begin_attempt(start);
        let file = open_destination(session.destination(), start)?;
        let mut tracker = ProgressTracker::new(
            session.expected_size(),
            self.config.assumed_size,
            start,
            self.config.progress_interval,
            Instant::now(),
        );

        let mut body = PipedReader::spawn(
            response,
            self.config.chunk_size,
            self.config.stall_timeout,
            cancel,
        )
        .context(|| "failed to start network reader".to_string())?;

        copy_to_file(
            &mut body,
            file,
            session,
            &mut tracker,
            self.config.chunk_size,
            cancel,
            reporter,
        )
    }
}

/// Map a failed request (no response) onto the error taxonomy.
fn classify_request_error(url: &str, err: reqwest::Error) -> InstallError {
    if err.is_builder() {
        return InstallError::UnsupportedSource {
            url: url.to_string(),
        };
    }
    if err.is_body() || err.is_decode() {
        return InstallError::TransferIncomplete {
            url: url.to_string(),
            received: 0,
            expected: None,
        };
    }
    InstallError::NetworkUnavailable {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(url: &str, status: StatusCode) -> InstallError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => InstallError::RemoteNotFound {
            url: url.to_string(),
            status: status.as_u16(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => InstallError::ServerError {
            url: url.to_string(),
            status: status.as_u16(),
        },
        status if status.is_server_error() => InstallError::ServerError {
            url: url.to_string(),
            status: status.as_u16(),
        },
        status => InstallError::Unexpected(format!("{} answered HTTP {}", url, status)),
    }
}

fn partial_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn remove_partial(path: &Path) -> InstallResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(|| format!("failed to discard {}", path.display())),
    }
}

/// Open the temporary file for writing at `start`.
///
/// A start of zero truncates; otherwise anything past `start` is cut off
/// and writing continues from there.
fn open_destination(path: &Path, start: u64) -> InstallResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .context(|| format!("failed to create {}", parent.display()))?;
    }

    if start == 0 {
        return File::create(path).context(|| format!("failed to create {}", path.display()));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .context(|| format!("failed to open {}", path.display()))?;
    file.set_len(start)
        .context(|| format!("failed to truncate {}", path.display()))?;
    file.seek(SeekFrom::End(0))
        .context(|| format!("failed to seek {}", path.display()))?;
    Ok(file)
}

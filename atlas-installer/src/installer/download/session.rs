//! Transfer session state.
//!
//! A [`TransferSession`] describes one download into a temporary file. The
//! orchestrator creates it once per operation and reuses it across attempts,
//! so a retry can resume from the bytes already on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

/// State of one in-flight or completed download.
#[derive(Debug, Clone)]
pub struct TransferSession {
    /// Source URL.
    pub url: String,
    /// Temporary destination file.
    pub destination: PathBuf,
    /// Size reported by the transfer response, once known.
    total_size: Option<u64>,
    /// Size reported by a metadata probe before the transfer.
    size_hint: Option<u64>,
    /// Bytes on disk so far.
    bytes_transferred: u64,
    /// When the current attempt started.
    pub started: Option<Instant>,
    /// Number of attempts begun.
    pub attempts: u32,
}

impl TransferSession {
    /// Create a new session.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            total_size: None,
            size_hint: None,
            bytes_transferred: 0,
            started: None,
            attempts: 0,
        }
    }

    /// Temporary destination file.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Size reported by the transfer response, if any.
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Best known expected size: the transfer response's, else the probe's.
    pub fn expected_size(&self) -> Option<u64> {
        self.total_size.or(self.size_hint)
    }

    /// Bytes on disk so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Record the size reported by a metadata probe.
    pub fn set_size_hint(&mut self, size: Option<u64>) {
        self.size_hint = size.filter(|size| *size > 0);
    }

    /// Record the size reported by the transfer response.
    ///
    /// It supersedes any probe hint. Once determined, the size does not
    /// change.
    pub fn set_total_size(&mut self, size: u64) {
        if self.total_size.is_none() && size > 0 {
            self.total_size = Some(size);
        }
    }

    /// Record bytes written during the current attempt.
    ///
    /// The count never decreases within an attempt.
    pub fn record_progress(&mut self, bytes: u64) {
        self.bytes_transferred = self.bytes_transferred.max(bytes);
    }

    /// Begin a new attempt starting at `offset` bytes already on disk.
    ///
    /// A restart from zero (the server ignored a range request, or resume is
    /// disabled) resets the byte count.
    pub fn begin_attempt(&mut self, offset: u64) {
        self.attempts += 1;
        self.bytes_transferred = offset;
        self.started = Some(Instant::now());
    }
}

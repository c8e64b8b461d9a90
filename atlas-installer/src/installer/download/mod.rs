//! Transfer engine.
//!
//! Streams one remote archive to a temporary file, including:
//! - HTTP(S) downloads with range-request resume (`http`)
//! - `file://` copies for local mirrors (`file`)
//! - The cancellable chunk loop shared by both (`stream`)
//! - Helper threads that keep blocking network calls cancellable (`watch`)
//! - Per-operation transfer state (`session`)
//! - Throttled progress snapshots with throughput and ETA (`progress`)
//!
//! # Architecture
//!
//! ```text
//! SchemeTransport (dispatch by URL scheme)
//!         │
//!         ├── HttpTransport ──┐
//!         │                   ├── copy_to_file (chunk loop, cancellation)
//!         └── FileTransport ──┘          │
//!                                        └── ProgressTracker → Reporter
//! ```
//!
//! # Example
//!
//! ```ignore
//! use atlas_installer::installer::download::{SchemeTransport, TransferSession};
//!
//! let transport = SchemeTransport::new(TransferConfig::default())?;
//! let mut session = TransferSession::new(url, "/tmp/atlas_0123.tar");
//! session.set_size_hint(transport.probe_size(url, &cancel));
//! transport.transfer(&mut session, &cancel, &reporter)?;
//! ```

mod file;
mod http;
mod partial;
mod progress;
mod session;
mod stream;
mod watch;

pub use file::FileTransport;
pub use http::HttpTransport;
pub use progress::{format_eta, format_size, ProgressSnapshot, ProgressTracker};
pub use session::TransferSession;

use tokio_util::sync::CancellationToken;

use super::config::TransferConfig;
use super::error::{InstallError, InstallResult};
use super::events::Reporter;
use super::traits::Transport;

/// Dispatches to the first registered transport that supports a URL.
pub struct SchemeTransport {
    transports: Vec<Box<dyn Transport>>,
}

impl SchemeTransport {
    /// Create a dispatcher with the HTTP(S) and `file://` transports.
    pub fn new(config: TransferConfig) -> InstallResult<Self> {
        Ok(Self::empty()
            .with_transport(Box::new(HttpTransport::new(config.clone())?))
            .with_transport(Box::new(FileTransport::new(config))))
    }

    /// Create a dispatcher with no transports.
    pub fn empty() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    /// Register another transport (builder pattern).
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    fn select(&self, url: &str) -> InstallResult<&dyn Transport> {
        self.transports
            .iter()
            .find(|t| t.supports(url))
            .map(|t| &**t)
            .ok_or_else(|| InstallError::UnsupportedSource {
                url: url.to_string(),
            })
    }
}

impl Transport for SchemeTransport {
    fn supports(&self, url: &str) -> bool {
        self.transports.iter().any(|t| t.supports(url))
    }

    fn probe_size(&self, url: &str, cancel: &CancellationToken) -> Option<u64> {
        self.select(url).ok()?.probe_size(url, cancel)
    }

    fn transfer(
        &self,
        session: &mut TransferSession,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> InstallResult<u64> {
        let url = session.url.clone();
        self.select(&url)?.transfer(session, cancel, reporter)
    }
}

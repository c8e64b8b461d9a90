//! The chunked copy loop shared by all transports.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::progress::{format_size, ProgressTracker};
use super::session::TransferSession;
use crate::installer::error::{ErrContext, InstallError, InstallResult};
use crate::installer::events::Reporter;

/// Copy `reader` into `file` chunk by chunk.
///
/// The cancellation token is checked before every chunk read. Whatever the
/// result, `file` is flushed and closed before this returns, so a partial
/// file can be resumed and a complete one can be opened by the extractor.
///
/// End of stream with nothing on disk, or with fewer bytes than the
/// expected size, is reported as [`InstallError::TransferIncomplete`].
pub(crate) fn copy_to_file<R: Read>(
    reader: &mut R,
    file: File,
    session: &mut TransferSession,
    tracker: &mut ProgressTracker,
    chunk_size: usize,
    cancel: &CancellationToken,
    reporter: &Reporter<'_>,
) -> InstallResult<u64> {
    let path = session.destination.clone();
    let mut writer = BufWriter::with_capacity(chunk_size, file);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut bytes = session.bytes_transferred();

    loop {
        if cancel.is_cancelled() {
            reporter.info(format!(
                "Download cancelled after {}",
                format_size(bytes)
            ));
            return Err(InstallError::Cancelled);
        }

        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                reporter.warn(format!("Connection lost: {}", e));
                return Err(InstallError::TransferIncomplete {
                    url: session.url.clone(),
                    received: bytes,
                    expected: session.expected_size(),
                });
            }
        };

        writer
            .write_all(&buffer[..read])
            .context(|| format!("failed to write {}", path.display()))?;
        bytes += read as u64;
        session.record_progress(bytes);

        if let Some(snapshot) = tracker.observe(bytes, Instant::now()) {
            reporter.transfer(&snapshot);
        }
        if let Some(milestone) = tracker.take_milestone() {
            reporter.info(format!(
                "Downloaded {}% ({} of {}{})",
                milestone,
                format_size(bytes),
                if tracker.is_estimated() { "~" } else { "" },
                format_size(tracker.total_bytes())
            ));
        }
    }

    let file = writer
        .into_inner()
        .context(|| format!("failed to flush {}", path.display()))?;
    file.sync_all()
        .context(|| format!("failed to sync {}", path.display()))?;
    drop(file);

    let expected = session.expected_size();
    if bytes == 0 || expected.is_some_and(|total| bytes < total) {
        return Err(InstallError::TransferIncomplete {
            url: session.url.clone(),
            received: bytes,
            expected,
        });
    }

    let snapshot = tracker.finish(bytes, Instant::now());
    reporter.transfer(&snapshot);
    Ok(bytes)
}

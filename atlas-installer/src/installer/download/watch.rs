//! Cancellation and stall supervision for blocking network I/O.
//!
//! The blocking HTTP client cannot be interrupted from another thread, so
//! requests and body reads run on helper threads while the caller keeps
//! polling the cancellation token. An abandoned helper finishes on its own
//! once the client gives up; whatever it produces is dropped.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// How often a waiting caller re-checks the cancellation token.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Chunks buffered between the reader thread and the copy loop.
const PIPE_DEPTH: usize = 4;

/// Why a supervised call produced no result.
#[derive(Debug)]
pub(crate) enum Interrupted {
    Cancelled,
    TimedOut,
    Worker(io::Error),
}

/// Run `call` on a helper thread, giving up after `limit` or on cancellation.
pub(crate) fn run_interruptible<T, F>(
    name: &str,
    limit: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, Interrupted>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }

    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = tx.send(call());
        })
        .map_err(Interrupted::Worker)?;

    let deadline = Instant::now().checked_add(limit);
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(value) => return Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    return Err(Interrupted::Cancelled);
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(Interrupted::TimedOut);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Interrupted::Worker(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} stopped without a result", name),
                )))
            }
        }
    }
}

/// `Read` adapter that pulls from a helper thread.
///
/// `read` fails with `Interrupted` once the token fires and with `TimedOut`
/// when the source produces nothing for `stall_timeout`.
pub(crate) struct PipedReader {
    chunks: Receiver<io::Result<Vec<u8>>>,
    current: Vec<u8>,
    offset: usize,
    finished: bool,
    stall_timeout: Duration,
    cancel: CancellationToken,
}

impl PipedReader {
    pub(crate) fn spawn<R>(
        mut source: R,
        chunk_size: usize,
        stall_timeout: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(PIPE_DEPTH);
        let chunk_size = chunk_size.max(1);

        thread::Builder::new()
            .name("atlas-net-read".to_string())
            .spawn(move || loop {
                let mut buffer = vec![0u8; chunk_size];
                let message = match source.read(&mut buffer) {
                    Ok(n) => {
                        buffer.truncate(n);
                        Ok(buffer)
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                // Empty chunk is end of stream
                let last = !matches!(&message, Ok(chunk) if !chunk.is_empty());
                if tx.send(message).is_err() || last {
                    break;
                }
            })?;

        Ok(Self {
            chunks: rx,
            current: Vec::new(),
            offset: 0,
            finished: false,
            stall_timeout,
            cancel: cancel.clone(),
        })
    }

    /// Wait for the next chunk. `Ok(false)` means end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        let started = Instant::now();
        loop {
            match self.chunks.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(chunk)) if chunk.is_empty() => {
                    self.finished = true;
                    return Ok(false);
                }
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.offset = 0;
                    return Ok(true);
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                    }
                    if started.elapsed() >= self.stall_timeout {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!(
                                "no data received for {}s",
                                self.stall_timeout.as_secs_f64()
                            ),
                        ));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.finished = true;
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "network reader stopped",
                    ));
                }
            }
        }
    }
}

impl Read for PipedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.offset >= self.current.len() && (self.finished || !self.fill()?) {
            return Ok(0);
        }

        let n = buf.len().min(self.current.len() - self.offset);
        buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

//! Supervision of external tool processes.
//!
//! A tool runs with its output drained on reader threads so it can never
//! block on a full pipe. The supervising thread polls for exit, the
//! wall-clock deadline, and cancellation; the child is killed on timeout,
//! on cancellation, and when the guard is dropped.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How often the supervisor polls the child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Which stream a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// How a supervised process ended.
#[derive(Debug)]
pub enum ProcessExit {
    /// The process exited by itself.
    Exited {
        status: ExitStatus,
        /// Last few lines written to stderr.
        stderr_tail: Vec<String>,
    },
    /// The deadline passed and the process was killed.
    TimedOut,
    /// The token was cancelled and the process was killed.
    Cancelled,
}

enum Wait {
    Exited(ExitStatus),
    Stopped(ProcessExit),
    Failed(io::Error),
}

/// Kills the child if it is still running when dropped.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            if let Err(e) = self.0.kill() {
                warn!(pid = self.0.id(), error = %e, "Failed to kill tool process");
            }
            let _ = self.0.wait();
        }
    }
}

/// Run `command` to completion under supervision.
///
/// Every line of output (split on newlines, carriage returns and
/// backspaces, which progress meters use to redraw) is passed to
/// `on_line`, possibly from another thread.
pub fn run_supervised(
    command: &mut Command,
    timeout: Duration,
    cancel: &CancellationToken,
    on_line: &(dyn Fn(Stream, &str) + Sync),
) -> io::Result<ProcessExit> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut guard = ChildGuard(command.spawn()?);
    let stdout = guard.0.stdout.take();
    let stderr = guard.0.stderr.take();
    let deadline = Instant::now() + timeout;

    thread::scope(|scope| {
        let out_reader = stdout.map(|pipe| {
            scope.spawn(move || {
                drain_lines(pipe, |line| on_line(Stream::Stdout, line));
            })
        });
        let err_reader = stderr.map(|pipe| {
            scope.spawn(move || {
                let mut tail = Vec::new();
                drain_lines(pipe, |line| {
                    on_line(Stream::Stderr, line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line.to_string());
                });
                tail
            })
        });

        let wait = loop {
            match guard.0.try_wait() {
                Ok(Some(status)) => break Wait::Exited(status),
                Ok(None) => {}
                Err(e) => break Wait::Failed(e),
            }
            if cancel.is_cancelled() {
                break Wait::Stopped(ProcessExit::Cancelled);
            }
            if Instant::now() >= deadline {
                break Wait::Stopped(ProcessExit::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Killing closes the pipes, which lets the readers finish
        if !matches!(wait, Wait::Exited(_)) {
            let _ = guard.0.kill();
            let _ = guard.0.wait();
        }

        if let Some(reader) = out_reader {
            let _ = reader.join();
        }
        let stderr_tail = err_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        match wait {
            Wait::Exited(status) => Ok(ProcessExit::Exited {
                status,
                stderr_tail,
            }),
            Wait::Stopped(exit) => Ok(exit),
            Wait::Failed(e) => Err(e),
        }
    })
}

/// Read `pipe` to the end, calling `on_line` for every non-empty line.
fn drain_lines(mut pipe: impl Read, mut on_line: impl FnMut(&str)) {
    let mut buffer = [0u8; 4096];
    let mut pending = Vec::new();

    let mut emit = |bytes: &[u8]| {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim();
        if !line.is_empty() {
            on_line(line);
        }
    };

    loop {
        let read = match pipe.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        for &byte in &buffer[..read] {
            if matches!(byte, b'\n' | b'\r' | 0x08) {
                emit(&pending);
                pending.clear();
            } else {
                pending.push(byte);
            }
        }
    }
    emit(&pending);
}

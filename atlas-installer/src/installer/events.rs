//! Progress and status reporting.
//!
//! The installer core never talks to a UI directly. It writes
//! [`InstallEvent`]s to an [`InstallReporter`] and whoever drives the
//! operation (a CLI, a GUI, a test) decides what to do with them.
//!
//! Reporting must never block the operation being reported on, so every
//! shipped sink either buffers in memory or forwards over an unbounded
//! channel.

use std::fmt;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::download::ProgressSnapshot;
use super::outcome::{InstallOutcome, InstallPhase};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Short tag used when rendering log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// A timestamped log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl LogLine {
    /// Create a log line stamped with the current local time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Events emitted during an installation.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallEvent {
    /// Free-text log line.
    Log(LogLine),
    /// Current activity and overall percentage (0-100).
    Status { message: String, percent: f64 },
    /// Raw transfer snapshot, for observers that render their own bars.
    Transfer(ProgressSnapshot),
    /// State machine transition.
    Phase(InstallPhase),
    /// Terminal outcome. Always the last event of an operation.
    Done(InstallOutcome),
}

/// Receiver of installation events.
///
/// `report` may be called from any thread and must not block.
pub trait InstallReporter: Send + Sync {
    fn report(&self, event: InstallEvent);
}

/// Forwards events over an unbounded tokio channel.
///
/// The receiving half can be consumed from async code (`recv().await`) or
/// from a plain thread (`blocking_recv()`).
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<InstallEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InstallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl InstallReporter for ChannelReporter {
    fn report(&self, event: InstallEvent) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.tx.send(event);
    }
}

/// Records every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<InstallEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far.
    pub fn events(&self) -> Vec<InstallEvent> {
        self.events.lock().clone()
    }

    /// Messages of all recorded log lines.
    pub fn log_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InstallEvent::Log(line) => Some(line.message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Percentages of all recorded status events, in order.
    pub fn percents(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InstallEvent::Status { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    /// Recorded phase transitions, in order.
    pub fn phases(&self) -> Vec<InstallPhase> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InstallEvent::Phase(phase) => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// The terminal outcome, if one was reported.
    pub fn outcome(&self) -> Option<InstallOutcome> {
        self.events.lock().iter().rev().find_map(|event| match event {
            InstallEvent::Done(outcome) => Some(outcome.clone()),
            _ => None,
        })
    }
}

impl InstallReporter for MemoryReporter {
    fn report(&self, event: InstallEvent) {
        self.events.lock().push(event);
    }
}

/// Writes status and outcome events to `tracing`.
///
/// Log lines are already mirrored to `tracing` by the installer, so this
/// sink only adds the events that have no log counterpart.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl InstallReporter for TracingReporter {
    fn report(&self, event: InstallEvent) {
        match event {
            InstallEvent::Status { message, percent } => {
                debug!(percent, "{}", message)
            }
            InstallEvent::Done(outcome) => info!(outcome = %outcome, "Installation finished"),
            _ => {}
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl InstallReporter for NullReporter {
    fn report(&self, _event: InstallEvent) {}
}

/// Overall percentage band of a phase.
pub fn phase_band(phase: InstallPhase) -> (f64, f64) {
    match phase {
        InstallPhase::Idle | InstallPhase::CheckingExisting => (0.0, 5.0),
        InstallPhase::Downloading => (5.0, 80.0),
        InstallPhase::Extracting => (80.0, 95.0),
        InstallPhase::Finalizing => (95.0, 100.0),
        InstallPhase::Complete | InstallPhase::Failed | InstallPhase::Cancelled => {
            (100.0, 100.0)
        }
    }
}

/// Installer-side handle on a reporter.
///
/// Mirrors log lines to `tracing`, maps per-phase progress onto the overall
/// 0-100 scale and keeps the overall percentage from going backwards.
pub struct Reporter<'a> {
    sink: &'a dyn InstallReporter,
    percent: Mutex<f64>,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a dyn InstallReporter) -> Self {
        Self {
            sink,
            percent: Mutex::new(0.0),
        }
    }

    /// Emit a log line and mirror it to `tracing`.
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => debug!("{}", message),
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }
        self.sink
            .report(InstallEvent::Log(LogLine::new(severity, message)));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    /// Emit a phase transition, and a status line at the start of its band
    /// for non-terminal phases.
    pub fn phase(&self, phase: InstallPhase) {
        self.sink.report(InstallEvent::Phase(phase));
        if !phase.is_terminal() {
            let (start, _) = phase_band(phase);
            self.status(phase.name(), start);
        }
    }

    /// Emit a status line at an overall percentage.
    ///
    /// The emitted percentage never drops below one reported earlier.
    pub fn status(&self, message: impl Into<String>, percent: f64) {
        let percent = {
            let mut last = self.percent.lock();
            *last = percent.clamp(0.0, 100.0).max(*last);
            *last
        };
        self.sink.report(InstallEvent::Status {
            message: message.into(),
            percent,
        });
    }

    /// Emit a status line at `fraction` (0-100) of the given phase's band.
    pub fn phase_progress(&self, phase: InstallPhase, message: impl Into<String>, fraction: f64) {
        let (start, end) = phase_band(phase);
        let fraction = fraction.clamp(0.0, 100.0) / 100.0;
        self.status(message, start + (end - start) * fraction);
    }

    /// Forward a transfer snapshot.
    pub fn transfer(&self, snapshot: &ProgressSnapshot) {
        self.sink.report(InstallEvent::Transfer(snapshot.clone()));
        self.phase_progress(InstallPhase::Downloading, snapshot.message(), snapshot.percent);
    }

    /// Emit the terminal outcome.
    pub fn done(&self, outcome: &InstallOutcome) {
        if outcome.is_success() {
            self.status(outcome.phase().name(), 100.0);
        }
        self.sink.report(InstallEvent::Done(outcome.clone()));
    }

    /// Last overall percentage emitted.
    pub fn percent(&self) -> f64 {
        *self.percent.lock()
    }
}

//! Handle to an installation running on a background thread.

use std::any::Any;
use std::thread::JoinHandle;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::error::ErrorKind;
use super::events::InstallEvent;
use super::outcome::{FailureReason, InstallOutcome};

/// Returned by [`Installer::spawn`](super::Installer::spawn).
///
/// Events arrive on [`events`](Self::events) in emission order; the last
/// one is always `InstallEvent::Done`. Dropping the handle detaches the
/// worker; it keeps running until it finishes or is cancelled.
pub struct InstallHandle {
    cancel: CancellationToken,
    events: UnboundedReceiver<InstallEvent>,
    thread: JoinHandle<InstallOutcome>,
}

impl InstallHandle {
    pub(crate) fn new(
        cancel: CancellationToken,
        events: UnboundedReceiver<InstallEvent>,
        thread: JoinHandle<InstallOutcome>,
    ) -> Self {
        Self {
            cancel,
            events,
            thread,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker, e.g. for a Ctrl+C handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The event stream.
    pub fn events(&mut self) -> &mut UnboundedReceiver<InstallEvent> {
        &mut self.events
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return its outcome.
    pub fn join(self) -> InstallOutcome {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(message = %message, "Installer thread panicked");
                InstallOutcome::Failed(FailureReason {
                    kind: ErrorKind::Unexpected,
                    summary: "The installation failed unexpectedly".to_string(),
                    message,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "installer thread panicked".to_string()
    }
}

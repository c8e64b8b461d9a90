//! Terminal rendering of installer events.

use std::time::Duration;

use atlas_installer::installer::InstallEvent;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One overall 0-100 bar driven by status events.
///
/// Drawn on stdout so it does not fight with log lines on stderr.
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stdout());
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn handle(&self, event: &InstallEvent) {
        match event {
            InstallEvent::Status { message, percent } => {
                self.bar.set_position(percent.round().clamp(0.0, 100.0) as u64);
                self.bar.set_message(message.clone());
            }
            InstallEvent::Phase(phase) if !phase.is_terminal() => {
                self.bar.set_message(phase.name());
            }
            InstallEvent::Done(_) => self.bar.finish_and_clear(),
            _ => {}
        }
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}


//! Progress tracking for a transfer session.
//!
//! [`ProgressTracker`] turns the raw byte count of the transfer loop into
//! throttled [`ProgressSnapshot`]s carrying percentage, throughput and ETA.

use std::time::{Duration, Instant};

/// Below this throughput no ETA is reported (0.1 MiB/s).
const MIN_ETA_THROUGHPUT: f64 = 0.1 * 1024.0 * 1024.0;

/// Point-in-time view of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Percentage complete (0-100, non-decreasing within a session).
    pub percent: f64,
    /// Bytes on disk, including any resumed prefix.
    pub bytes_transferred: u64,
    /// Expected total size in bytes.
    pub total_bytes: u64,
    /// Whether `total_bytes` is an assumed value rather than server-reported.
    pub size_estimated: bool,
    /// Observed throughput in bytes per second.
    pub throughput: Option<f64>,
    /// Estimated time remaining.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Human-readable status line.
    pub fn message(&self) -> String {
        let mut line = format!(
            "Downloading: {} / {}{} ({:.0}%)",
            format_size(self.bytes_transferred),
            if self.size_estimated { "~" } else { "" },
            format_size(self.total_bytes),
            self.percent
        );
        if let Some(speed) = self.throughput {
            line.push_str(&format!(" - {}/s", format_size(speed as u64)));
        }
        if let Some(eta) = self.eta {
            line.push_str(&format!(" - ETA: {}", format_eta(eta)));
        }
        line
    }
}

/// Tracks one transfer session and produces throttled snapshots.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    size_estimated: bool,
    start_bytes: u64,
    started: Instant,
    interval: Duration,
    last_emit: Option<Instant>,
    last_percent: f64,
    last_milestone: u8,
}

impl ProgressTracker {
    /// Create a tracker.
    ///
    /// # Arguments
    ///
    /// * `total` - Server-reported size, if known
    /// * `assumed_size` - Size used for percentages when `total` is unknown
    /// * `start_bytes` - Bytes already on disk (resumed prefix)
    /// * `interval` - Minimum interval between snapshots
    /// * `now` - Session start time
    pub fn new(
        total: Option<u64>,
        assumed_size: u64,
        start_bytes: u64,
        interval: Duration,
        now: Instant,
    ) -> Self {
        let (total_bytes, size_estimated) = match total {
            Some(size) if size > 0 => (size, false),
            _ => (assumed_size, true),
        };
        let mut tracker = Self {
            total_bytes,
            size_estimated,
            start_bytes,
            started: now,
            interval,
            last_emit: None,
            last_percent: 0.0,
            last_milestone: 0,
        };
        tracker.last_percent = tracker.raw_percent(start_bytes);
        tracker.last_milestone = (tracker.last_percent / 10.0) as u8;
        tracker
    }

    /// Expected total size.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Whether the total is an assumed value.
    pub fn is_estimated(&self) -> bool {
        self.size_estimated
    }

    /// Record progress; returns a snapshot if the throttle interval elapsed.
    pub fn observe(&mut self, bytes: u64, now: Instant) -> Option<ProgressSnapshot> {
        let due = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if !due {
            return None;
        }
        self.last_emit = Some(now);
        Some(self.snapshot(bytes, now))
    }

    /// Produce the final snapshot of a finished transfer (100%).
    pub fn finish(&mut self, bytes: u64, now: Instant) -> ProgressSnapshot {
        self.last_emit = Some(now);
        let mut snapshot = self.snapshot(bytes, now);
        snapshot.percent = 100.0;
        snapshot.eta = None;
        self.last_percent = 100.0;
        snapshot
    }

    /// Next 10% milestone crossed since the last call, if any.
    pub fn take_milestone(&mut self) -> Option<u8> {
        let reached = (self.last_percent / 10.0) as u8;
        if reached > self.last_milestone {
            self.last_milestone = reached;
            Some(reached * 10)
        } else {
            None
        }
    }

    fn raw_percent(&self, bytes: u64) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (bytes as f64 * 100.0 / self.total_bytes as f64).clamp(0.0, 100.0)
    }

    fn snapshot(&mut self, bytes: u64, now: Instant) -> ProgressSnapshot {
        let percent = self.raw_percent(bytes).max(self.last_percent);
        self.last_percent = percent;

        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let session_bytes = bytes.saturating_sub(self.start_bytes);
        let throughput = if elapsed > 0.0 {
            Some(session_bytes as f64 / elapsed)
        } else {
            None
        };

        let eta = match throughput {
            Some(speed) if speed >= MIN_ETA_THROUGHPUT && bytes < self.total_bytes => {
                let remaining = (self.total_bytes - bytes) as f64;
                Some(Duration::from_secs_f64(remaining / speed))
            }
            _ => None,
        };

        ProgressSnapshot {
            percent,
            bytes_transferred: bytes,
            total_bytes: self.total_bytes,
            size_estimated: self.size_estimated,
            throughput,
            eta,
        }
    }
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a remaining-time estimate.
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_first_observation_is_emitted() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(100), 0, 0, Duration::from_secs(1), start);

        assert!(tracker.observe(10, start).is_some());
        assert!(tracker.observe(20, start + Duration::from_millis(500)).is_none());
        assert!(tracker.observe(30, start + Duration::from_millis(1000)).is_some());
    }

    #[test]
    fn test_zero_elapsed_has_no_throughput() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(100), 0, 0, Duration::from_secs(1), start);

        let snapshot = tracker.observe(10, start).unwrap();
        assert_eq!(snapshot.throughput, None);
        assert_eq!(snapshot.eta, None);
    }

    #[test]
    fn test_slow_transfer_has_no_eta() {
        let start = Instant::now();
        let mut tracker =
            ProgressTracker::new(Some(100 * MIB), 0, 0, Duration::from_secs(1), start);

        // 1 KiB in 10 seconds
        let snapshot = tracker.observe(1024, start + Duration::from_secs(10)).unwrap();
        assert!(snapshot.throughput.unwrap() > 0.0);
        assert_eq!(snapshot.eta, None);
    }

    #[test]
    fn test_eta_from_throughput() {
        let start = Instant::now();
        let mut tracker =
            ProgressTracker::new(Some(100 * MIB), 0, 0, Duration::from_secs(1), start);

        // 10 MiB in 10 seconds = 1 MiB/s, 90 MiB remaining
        let snapshot = tracker
            .observe(10 * MIB, start + Duration::from_secs(10))
            .unwrap();
        assert_eq!(snapshot.percent, 10.0);
        let eta = snapshot.eta.unwrap().as_secs_f64();
        assert!((eta - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_unknown_size_uses_assumed_size() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(None, 1000, 0, Duration::ZERO, start);
        assert!(tracker.is_estimated());

        let snapshot = tracker.observe(500, start).unwrap();
        assert!(snapshot.size_estimated);
        assert_eq!(snapshot.percent, 50.0);

        // Exceeding the assumed size never reports more than 100%
        let snapshot = tracker.observe(5000, start + Duration::from_secs(1)).unwrap();
        assert_eq!(snapshot.percent, 100.0);
    }

    #[test]
    fn test_resumed_session_starts_at_prefix() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(1000), 0, 500, Duration::ZERO, start);

        let snapshot = tracker.observe(600, start + Duration::from_secs(1)).unwrap();
        assert_eq!(snapshot.percent, 60.0);
        // Throughput only counts bytes moved in this session
        assert_eq!(snapshot.throughput, Some(100.0));
    }

    #[test]
    fn test_finish_reports_complete() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(None, 1000, 0, Duration::from_secs(1), start);
        let snapshot = tracker.finish(10, start);
        assert_eq!(snapshot.percent, 100.0);
    }

    #[test]
    fn test_milestones() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(100), 0, 0, Duration::ZERO, start);

        tracker.observe(5, start);
        assert_eq!(tracker.take_milestone(), None);

        tracker.observe(25, start);
        assert_eq!(tracker.take_milestone(), Some(20));
        assert_eq!(tracker.take_milestone(), None);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * MIB), "5.0 MB");
        assert_eq!(format_size(20 * 1024 * MIB), "20.00 GB");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Duration::from_secs(45)), "45s");
        assert_eq!(format_eta(Duration::from_secs(192)), "3m 12s");
        assert_eq!(format_eta(Duration::from_secs(3900)), "1h 05m");
    }

    proptest! {
        #[test]
        fn prop_percent_is_monotonic_and_bounded(
            total in proptest::option::of(1u64..10_000_000),
            start_bytes in 0u64..1_000_000,
            chunks in proptest::collection::vec(0u64..500_000, 1..50),
        ) {
            let start = Instant::now();
            let mut tracker =
                ProgressTracker::new(total, 4_000_000, start_bytes, Duration::ZERO, start);

            let mut bytes = start_bytes;
            let mut last = 0.0f64;
            for (i, chunk) in chunks.iter().enumerate() {
                bytes += chunk;
                let now = start + Duration::from_millis(100 * (i as u64 + 1));
                if let Some(snapshot) = tracker.observe(bytes, now) {
                    prop_assert!(snapshot.percent >= last);
                    prop_assert!((0.0..=100.0).contains(&snapshot.percent));
                    last = snapshot.percent;
                }
            }

            let done = tracker.finish(bytes, start + Duration::from_secs(60));
            prop_assert!(done.percent >= last);
            prop_assert_eq!(done.percent, 100.0);
        }
    }
}

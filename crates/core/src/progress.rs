//! Progress Model (C4): byte counters, sliding-window speed, ETA.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of samples kept in the sliding window.
pub const DEFAULT_MAX_SAMPLES: usize = 10;

/// Terminal state a transfer can end in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Success,
    Failure(String),
}

/// Tracks one transfer's byte progress, instantaneous and average speed, and
/// terminal completion. Once terminal, further updates are ignored.
#[derive(Debug, Clone)]
pub struct ProgressState {
    total: u64,
    current: u64,
    start: Instant,
    last_update: Instant,
    samples: VecDeque<(Instant, u64)>,
    max_samples: usize,
    instantaneous_bps: f64,
    terminal: Option<Terminal>,
}

impl ProgressState {
    pub fn new(total: u64) -> Self {
        Self::with_max_samples(total, DEFAULT_MAX_SAMPLES)
    }

    pub fn with_max_samples(total: u64, max_samples: usize) -> Self {
        let now = Instant::now();
        Self {
            total,
            current: 0,
            start: now,
            last_update: now,
            samples: VecDeque::with_capacity(max_samples.max(1)),
            max_samples: max_samples.max(1),
            instantaneous_bps: 0.0,
            terminal: None,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    /// Record a new absolute byte count. Ignored once the transfer is
    /// terminal. `current` is clamped to `[previous, total]`: it is
    /// monotonically non-decreasing and bounded above by `total`.
    pub fn set_progress(&mut self, current: u64) {
        if self.terminal.is_some() {
            return;
        }
        let now = Instant::now();
        let current = current.clamp(self.current, self.total);

        let dt = now.duration_since(self.last_update);
        let dbytes = current.saturating_sub(self.current);
        if dt > Duration::ZERO && dbytes > 0 {
            self.instantaneous_bps = dbytes as f64 / dt.as_secs_f64();
        }

        self.current = current;
        self.last_update = now;

        self.samples.push_back((now, current));
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Mark the transfer terminal. Subsequent `set_progress` calls are
    /// no-ops. A successful terminal freezes `current` at `total`.
    pub fn finish(&mut self, terminal: Terminal) {
        if self.terminal.is_some() {
            return;
        }
        if terminal == Terminal::Success {
            self.current = self.total;
        }
        self.terminal = Some(terminal);
    }

    pub fn instantaneous_bytes_per_sec(&self) -> f64 {
        self.instantaneous_bps
    }

    /// Average bytes/second over the sliding window, or `None` if fewer than
    /// two samples are available or the span is zero.
    pub fn average_bytes_per_sec(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let (first_t, first_b) = *self.samples.front().unwrap();
        let (last_t, last_b) = *self.samples.back().unwrap();
        let span = last_t.duration_since(first_t).as_secs_f64();
        if span <= 0.0 {
            return None;
        }
        Some((last_b.saturating_sub(first_b)) as f64 / span)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Estimated time remaining, based on the average window speed.
    pub fn eta(&self) -> Eta {
        match self.average_bytes_per_sec() {
            Some(bps) if bps > 0.0 => {
                let remaining = self.total.saturating_sub(self.current) as f64;
                Eta::Known(Duration::from_secs_f64(remaining / bps))
            }
            _ => Eta::Unknown,
        }
    }
}

impl PartialEq for Terminal {
    fn eq(&self, other: &Self) -> bool {
        matches!((self, other), (Terminal::Success, Terminal::Success))
            || matches!((self, other), (Terminal::Failure(a), Terminal::Failure(b)) if a == b)
    }
}
impl Eq for Terminal {}

/// Estimated time remaining for a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    Known(Duration),
    Unknown,
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::Unknown => f.write_str("unknown"),
            Eta::Known(d) => {
                let secs = d.as_secs();
                if secs > 3600 {
                    write!(f, "{}h{}m", secs / 3600, (secs % 3600) / 60)
                } else if secs > 60 {
                    write!(f, "{}m{}s", secs / 60, secs % 60)
                } else {
                    write!(f, "{}s", secs)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn zero_byte_transfer_is_immediately_complete_on_finish() {
        let mut p = ProgressState::new(0);
        assert_eq!(p.total(), 0);
        assert_eq!(p.current(), 0);
        p.finish(Terminal::Success);
        assert_eq!(p.current(), 0);
        assert!(p.is_terminal());
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let mut p = ProgressState::new(100);
        p.set_progress(40);
        assert_eq!(p.current(), 40);
        p.set_progress(10); // must not go backwards
        assert_eq!(p.current(), 40);
        p.set_progress(1000); // must not exceed total
        assert_eq!(p.current(), 100);
    }

    #[test]
    fn terminal_freezes_state() {
        let mut p = ProgressState::new(100);
        p.set_progress(50);
        p.finish(Terminal::Success);
        assert_eq!(p.current(), 100);
        p.set_progress(10);
        assert_eq!(p.current(), 100);
        assert_eq!(p.terminal(), Some(&Terminal::Success));
    }

    #[test]
    fn failure_terminal_keeps_current_as_is() {
        let mut p = ProgressState::new(100);
        p.set_progress(30);
        p.finish(Terminal::Failure("disk full".into()));
        assert_eq!(p.current(), 30);
        assert_eq!(p.terminal(), Some(&Terminal::Failure("disk full".into())));
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let mut p = ProgressState::with_max_samples(1_000_000, 3);
        for i in 1..=10u64 {
            p.set_progress(i * 10);
            sleep(Duration::from_millis(1));
        }
        assert!(p.sample_count() <= 3);
    }

    #[test]
    fn eta_is_unknown_before_enough_samples() {
        let p = ProgressState::new(100);
        assert_eq!(p.eta(), Eta::Unknown);
    }

    #[test]
    fn eta_formats_buckets() {
        assert_eq!(Eta::Known(Duration::from_secs(5)).to_string(), "5s");
        assert_eq!(Eta::Known(Duration::from_secs(125)).to_string(), "2m5s");
        assert_eq!(Eta::Known(Duration::from_secs(3725)).to_string(), "1h2m");
        assert_eq!(Eta::Unknown.to_string(), "unknown");
    }
}

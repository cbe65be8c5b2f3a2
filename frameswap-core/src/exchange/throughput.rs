//! Exchange statistics.
//!
//! [`ThroughputEstimator`] keeps a rolling window of submitted payload
//! sizes and a smoothed round-trip time. The controller folds it into an
//! [`ExchangeStats`] snapshot after every tick that changes something.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default rolling window. Exchanges are paced by round trips, so the
/// window is wider than a single frame interval.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

// ── ExchangeStats ────────────────────────────────────────────────

/// Counters exposed to the host loop / UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeStats {
    /// Requests handed to the transport.
    pub submitted: u64,
    /// Replies composited into the output target.
    pub applied: u64,
    /// Exchanges lost to transport or decode failures.
    pub dropped: u64,
    /// Ticks skipped because the source layout was wrong.
    pub skipped: u64,
    /// Replies drained after a stop.
    pub discarded: u64,
    /// Total request body bytes submitted.
    pub bytes_sent: u64,
    /// Request bytes per second over the rolling window.
    pub throughput_bps: u64,
    /// Smoothed submit → reply latency.
    pub smoothed_rtt: Duration,
}

// ── ThroughputEstimator ──────────────────────────────────────────

struct Submission {
    at: Instant,
    bytes: u64,
}

/// Request throughput over a rolling window, plus a smoothed round trip.
///
/// The rate is measured between the oldest and newest submission in the
/// window. The oldest one only opens the interval, so its bytes are not
/// counted: two 4 MB submissions one second apart is 4 MB/s. Fewer than
/// two submissions report zero.
pub struct ThroughputEstimator {
    window: Duration,
    recent: VecDeque<Submission>,
    /// Sum of `bytes` over `recent`.
    recent_bytes: u64,
    rtt: Option<Duration>,
}

impl ThroughputEstimator {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            recent: VecDeque::new(),
            recent_bytes: 0,
            rtt: None,
        }
    }

    /// Record a submission of `bytes` now.
    pub fn record_submit(&mut self, bytes: u64) {
        self.record_submit_at(Instant::now(), bytes);
    }

    pub fn record_submit_at(&mut self, at: Instant, bytes: u64) {
        self.recent.push_back(Submission { at, bytes });
        self.recent_bytes += bytes;

        while let Some(oldest) = self.recent.front() {
            if at.saturating_duration_since(oldest.at) <= self.window {
                break;
            }
            self.recent_bytes -= oldest.bytes;
            self.recent.pop_front();
        }
    }

    /// Fold a round-trip sample in with weight 1/8. The first sample is
    /// taken as is.
    pub fn record_round_trip(&mut self, sample: Duration) {
        self.rtt = Some(match self.rtt {
            None => sample,
            Some(prev) => prev * 7 / 8 + sample / 8,
        });
    }

    /// Bytes per second between the oldest and newest submission in the
    /// window.
    pub fn bytes_per_second(&self) -> u64 {
        let (Some(oldest), Some(newest)) = (self.recent.front(), self.recent.back()) else {
            return 0;
        };
        let span = newest.at.saturating_duration_since(oldest.at);
        if span.is_zero() {
            return 0;
        }
        ((self.recent_bytes - oldest.bytes) as f64 / span.as_secs_f64()) as u64
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.rtt.unwrap_or_default()
    }
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

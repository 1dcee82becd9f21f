//! Achieved-throughput and latency tracking.
//!
//! Only successful render ticks are counted, so the figure reflects what the
//! user sees rather than how often requests were attempted.

use std::time::{Duration, Instant};

const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Object count of the last rendered result.
    pub object_count: usize,
    /// Renders per second over the last completed window.
    pub achieved_fps: Option<u32>,
    /// Round trip of the last successful detect call, unsmoothed.
    pub last_latency: Option<Duration>,
}

#[derive(Debug)]
pub struct StatsTracker {
    window_start: Instant,
    frame_count: u32,
    snapshot: StatsSnapshot,
}

impl StatsTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frame_count: 0,
            snapshot: StatsSnapshot::default(),
        }
    }

    /// Count one rendered tick. Returns the new throughput figure when at
    /// least one second has passed since the last flush.
    pub fn on_tick(&mut self, now: Instant, object_count: usize) -> Option<u32> {
        self.snapshot.object_count = object_count;
        self.frame_count += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < FLUSH_INTERVAL {
            return None;
        }
        let fps = (f64::from(self.frame_count) / elapsed.as_secs_f64()).round() as u32;
        self.snapshot.achieved_fps = Some(fps);
        self.frame_count = 0;
        self.window_start = now;
        Some(fps)
    }

    pub fn record_latency(&mut self, latency: Duration) {
        self.snapshot.last_latency = Some(latency);
    }

    /// Restart the measurement window, e.g. when the loop is restarted.
    pub fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.frame_count = 0;
        self.snapshot = StatsSnapshot::default();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot
    }

    pub fn pending_frames(&self) -> u32 {
        self.frame_count
    }
}

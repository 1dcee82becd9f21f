//! Cooperative timer primitives.
//!
//! The loop never sleeps on its own. The event pump asks the `IntervalTimer`
//! how long until the next tick, waits for that long (or for an event), and
//! then asks whether a tick is due. Tests drive the same timer with a
//! `ManualClock`, so no real wall-clock time is needed.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-advanced clock. Clones share the same offset.
#[derive(Clone, Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}

/// Periodic timer with `setInterval` semantics, minus the callback.
#[derive(Clone, Debug, Default)]
pub struct IntervalTimer {
    period: Option<Duration>,
    next_due: Option<Instant>,
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer; the first tick is due one full period after `now`.
    /// Arming an armed timer replaces the old schedule.
    pub fn arm(&mut self, now: Instant, period: Duration) {
        let period = period.max(Duration::from_micros(1));
        self.period = Some(period);
        self.next_due = Some(now + period);
    }

    pub fn cancel(&mut self) {
        self.period = None;
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Returns true when a tick is due and advances the schedule.
    ///
    /// Several missed periods collapse into a single tick; the next due time
    /// is the first period boundary strictly after `now`.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        let (Some(period), Some(due)) = (self.period, self.next_due) else {
            return false;
        };
        if now < due {
            return false;
        }
        let behind = now.duration_since(due);
        let skipped = behind.as_nanos() / period.as_nanos();
        let steps = u32::try_from(skipped + 1).unwrap_or(u32::MAX);
        self.next_due = Some(due + period.saturating_mul(steps));
        true
    }

    /// Time until the next tick, or `None` when disarmed.
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
    }
}

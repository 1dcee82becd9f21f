//! The capture-detect-render scheduler.
//!
//! `DetectionLoop` is a pure state machine: it decides *whether* a tick
//! captures and dispatches, and *whether* a completion is still wanted. It
//! performs no I/O itself. The capture step is passed in as a closure and the
//! network step goes through a `Dispatcher`, so the whole policy runs under a
//! manual clock in tests.
//!
//! Backpressure: at most one request is ever outstanding. The in-flight slot
//! is checked and claimed inside `tick` with no suspension point between the
//! two, and it is only released by the matching `complete`.

use std::time::{Duration, Instant};

use crate::camera::{CaptureError, EncodedImage};
use crate::detect::{DetectResponse, NetworkError};
use crate::scheduler::IntervalTimer;

/// Identifies one dispatched request. `epoch` changes on every `start`, so
/// answers to requests from an earlier run can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTicket {
    pub id: u64,
    pub epoch: u64,
}

/// A resolved request, success or failure.
#[derive(Debug)]
pub struct Completion {
    pub ticket: RequestTicket,
    pub outcome: Result<DetectResponse, NetworkError>,
}

/// Hands an encoded frame to whatever performs the network exchange.
///
/// Implementations must eventually report exactly one `Completion` for each
/// accepted dispatch. Returning an error means the request was never sent.
pub trait Dispatcher {
    fn dispatch(&mut self, ticket: RequestTicket, image: EncodedImage) -> Result<(), NetworkError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Loop is stopped; nothing happened.
    Idle,
    /// A previous request is unresolved; this tick was dropped.
    SkippedInFlight,
    /// Camera has not presented a frame yet.
    SkippedNotReady,
    Dispatched(RequestTicket),
    CaptureFailed(CaptureError),
    DispatchFailed(NetworkError),
}

#[derive(Debug, PartialEq)]
pub enum CompletionOutcome {
    /// Fresh result for the current run; render it.
    Delivered(DetectResponse),
    /// Request failed during the current run; degrade status, keep going.
    Failed(NetworkError),
    /// Result arrived after `stop` or belongs to an earlier run.
    Discarded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopCounters {
    pub ticks: u64,
    pub dispatched: u64,
    pub skipped_in_flight: u64,
    pub skipped_not_ready: u64,
    pub delivered: u64,
    pub failed: u64,
    pub discarded: u64,
}

#[derive(Debug)]
pub struct DetectionLoop {
    state: LoopState,
    timer: IntervalTimer,
    period: Duration,
    in_flight: Option<RequestTicket>,
    epoch: u64,
    next_id: u64,
    counters: LoopCounters,
}

impl DetectionLoop {
    pub fn new(period: Duration) -> Self {
        Self {
            state: LoopState::Stopped,
            timer: IntervalTimer::new(),
            period,
            in_flight: None,
            epoch: 0,
            next_id: 0,
            counters: LoopCounters::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn in_flight(&self) -> Option<RequestTicket> {
        self.in_flight
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn counters(&self) -> LoopCounters {
        self.counters
    }

    /// Stopped -> Running. A no-op when already running.
    pub fn start(&mut self, now: Instant) {
        if self.is_running() {
            return;
        }
        self.epoch += 1;
        self.state = LoopState::Running;
        self.timer.arm(now, self.period);
        log::debug!(
            "detection loop started (epoch {}, period {}ms)",
            self.epoch,
            self.period.as_millis()
        );
    }

    /// Running -> Stopped. Does not wait for an in-flight request; its
    /// completion will be discarded.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.state = LoopState::Stopped;
        self.timer.cancel();
        log::debug!(
            "detection loop stopped (epoch {}, in flight: {})",
            self.epoch,
            self.in_flight.is_some()
        );
    }

    /// Change the tick period. While running, the old timer is cancelled and
    /// a new one armed from `now` in the same call; the in-flight request and
    /// the run epoch are untouched.
    pub fn set_period(&mut self, now: Instant, period: Duration) {
        self.period = period;
        if self.is_running() {
            self.timer.arm(now, period);
        }
    }

    /// True when a tick is due. Advances the timer.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.is_running() && self.timer.fire_if_due(now)
    }

    pub fn until_next_tick(&self, now: Instant) -> Option<Duration> {
        if self.is_running() {
            self.timer.until_next(now)
        } else {
            None
        }
    }

    /// Run one tick: skip if busy, otherwise capture and dispatch.
    pub fn tick<F, D>(&mut self, capture: F, dispatcher: &mut D) -> TickOutcome
    where
        F: FnOnce() -> Result<EncodedImage, CaptureError>,
        D: Dispatcher + ?Sized,
    {
        if !self.is_running() {
            return TickOutcome::Idle;
        }
        self.counters.ticks += 1;

        if self.in_flight.is_some() {
            self.counters.skipped_in_flight += 1;
            return TickOutcome::SkippedInFlight;
        }

        let image = match capture() {
            Ok(image) if !image.is_empty() => image,
            Ok(_) | Err(CaptureError::NotReady) | Err(CaptureError::NotStarted) => {
                self.counters.skipped_not_ready += 1;
                return TickOutcome::SkippedNotReady;
            }
            Err(err) => return TickOutcome::CaptureFailed(err),
        };

        self.next_id += 1;
        let ticket = RequestTicket {
            id: self.next_id,
            epoch: self.epoch,
        };
        self.in_flight = Some(ticket);
        match dispatcher.dispatch(ticket, image) {
            Ok(()) => {
                self.counters.dispatched += 1;
                TickOutcome::Dispatched(ticket)
            }
            Err(err) => {
                self.in_flight = None;
                self.counters.failed += 1;
                TickOutcome::DispatchFailed(err)
            }
        }
    }

    /// Resolve a request. Frees the in-flight slot if the ticket matches and
    /// decides whether the result is still wanted.
    pub fn complete(&mut self, completion: Completion) -> CompletionOutcome {
        let Completion { ticket, outcome } = completion;
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        } else {
            log::warn!(
                "completion for unknown request {} (epoch {})",
                ticket.id,
                ticket.epoch
            );
        }

        if !self.is_running() || ticket.epoch != self.epoch {
            self.counters.discarded += 1;
            return CompletionOutcome::Discarded;
        }
        match outcome {
            Ok(response) => {
                self.counters.delivered += 1;
                CompletionOutcome::Delivered(response)
            }
            Err(err) => {
                self.counters.failed += 1;
                CompletionOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionResult;
    use crate::scheduler::{Clock, ManualClock};
    use crate::settings::tick_period;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Vec<RequestTicket>,
        refuse: bool,
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch(
            &mut self,
            ticket: RequestTicket,
            _image: EncodedImage,
        ) -> Result<(), NetworkError> {
            if self.refuse {
                return Err(NetworkError::Unreachable("worker gone".to_string()));
            }
            self.sent.push(ticket);
            Ok(())
        }
    }

    fn frame() -> Result<EncodedImage, CaptureError> {
        Ok(EncodedImage::new(vec![0xFF, 0xD8, 0xFF, 0xD9], 4, 4))
    }

    fn ok(ticket: RequestTicket) -> Completion {
        Completion {
            ticket,
            outcome: Ok(DetectResponse {
                result: DetectionResult::new(vec![]),
                latency: Duration::from_millis(40),
            }),
        }
    }

    /// Advance one period at a time and tick whenever the timer fires.
    fn run_for(
        lp: &mut DetectionLoop,
        clock: &ManualClock,
        dispatcher: &mut RecordingDispatcher,
        periods: u32,
    ) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..periods {
            clock.advance(lp.period());
            if lp.poll(clock.now()) {
                outcomes.push(lp.tick(frame, dispatcher));
            }
        }
        outcomes
    }

    #[test]
    fn ticks_at_configured_period_and_rearms_on_change() {
        let clock = ManualClock::new();
        let mut lp = DetectionLoop::new(tick_period(10));
        lp.start(clock.now());
        assert_eq!(lp.until_next_tick(clock.now()), Some(Duration::from_millis(100)));

        clock.advance_ms(100);
        assert!(lp.poll(clock.now()));

        clock.advance_ms(30);
        lp.set_period(clock.now(), tick_period(4));
        assert!(lp.is_running());
        assert_eq!(lp.until_next_tick(clock.now()), Some(Duration::from_millis(250)));
        clock.advance_ms(249);
        assert!(!lp.poll(clock.now()));
        clock.advance_ms(1);
        assert!(lp.poll(clock.now()));
    }

    #[test]
    fn slow_response_blocks_additional_dispatches() {
        let clock = ManualClock::new();
        let mut dispatcher = RecordingDispatcher::default();
        let mut lp = DetectionLoop::new(tick_period(10));
        lp.start(clock.now());

        let outcomes = run_for(&mut lp, &clock, &mut dispatcher, 6);
        assert!(matches!(outcomes[0], TickOutcome::Dispatched(_)));
        assert!(outcomes[1..]
            .iter()
            .all(|o| *o == TickOutcome::SkippedInFlight));
        assert_eq!(dispatcher.sent.len(), 1);
        assert_eq!(lp.counters().skipped_in_flight, 5);

        let first = dispatcher.sent[0];
        assert!(matches!(lp.complete(ok(first)), CompletionOutcome::Delivered(_)));
        assert_eq!(lp.in_flight(), None);

        let outcomes = run_for(&mut lp, &clock, &mut dispatcher, 1);
        assert!(matches!(outcomes[0], TickOutcome::Dispatched(_)));
        assert_eq!(dispatcher.sent.len(), 2);
    }

    #[test]
    fn not_ready_frames_are_skipped_without_claiming_slot() {
        let clock = ManualClock::new();
        let mut dispatcher = RecordingDispatcher::default();
        let mut lp = DetectionLoop::new(tick_period(5));
        lp.start(clock.now());

        let outcome = lp.tick(|| Err(CaptureError::NotReady), &mut dispatcher);
        assert_eq!(outcome, TickOutcome::SkippedNotReady);
        let outcome = lp.tick(|| Ok(EncodedImage::empty()), &mut dispatcher);
        assert_eq!(outcome, TickOutcome::SkippedNotReady);
        assert_eq!(lp.in_flight(), None);
        assert!(dispatcher.sent.is_empty());
    }

    #[test]
    fn network_failure_keeps_loop_running() {
        let clock = ManualClock::new();
        let mut dispatcher = RecordingDispatcher::default();
        let mut lp = DetectionLoop::new(tick_period(10));
        lp.start(clock.now());

        run_for(&mut lp, &clock, &mut dispatcher, 1);
        let ticket = dispatcher.sent[0];
        let outcome = lp.complete(Completion {
            ticket,
            outcome: Err(NetworkError::Unreachable("connection refused".to_string())),
        });
        assert!(matches!(outcome, CompletionOutcome::Failed(NetworkError::Unreachable(_))));
        assert!(lp.is_running());

        let outcomes = run_for(&mut lp, &clock, &mut dispatcher, 1);
        assert!(matches!(outcomes[0], TickOutcome::Dispatched(_)));
        assert_eq!(dispatcher.sent.len(), 2);
    }

    #[test]
    fn late_response_after_stop_is_discarded() {
        let clock = ManualClock::new();
        let mut dispatcher = RecordingDispatcher::default();
        let mut lp = DetectionLoop::new(tick_period(10));
        lp.start(clock.now());
        run_for(&mut lp, &clock, &mut dispatcher, 1);
        let ticket = dispatcher.sent[0];

        lp.stop();
        clock.advance_ms(500);
        assert!(!lp.poll(clock.now()));
        assert_eq!(lp.tick(frame, &mut dispatcher), TickOutcome::Idle);
        assert_eq!(lp.complete(ok(ticket)), CompletionOutcome::Discarded);
        assert_eq!(lp.counters().discarded, 1);
    }

    #[test]
    fn request_from_previous_run_still_blocks_then_is_discarded() {
        let clock = ManualClock::new();
        let mut dispatcher = RecordingDispatcher::default();
        let mut lp = DetectionLoop::new(tick_period(10));
        lp.start(clock.now());
        run_for(&mut lp, &clock, &mut dispatcher, 1);
        let stale = dispatcher.sent[0];

        lp.stop();
        lp.start(clock.now());
        let outcomes = run_for(&mut lp, &clock, &mut dispatcher, 2);
        assert_eq!(outcomes, vec![TickOutcome::SkippedInFlight; 2]);

        assert_eq!(lp.complete(ok(stale)), CompletionOutcome::Discarded);
        let outcomes = run_for(&mut lp, &clock, &mut dispatcher, 1);
        match &outcomes[0] {
            TickOutcome::Dispatched(ticket) => assert_eq!(ticket.epoch, lp.epoch()),
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    #[test]
    fn refused_dispatch_releases_slot() {
        let clock = ManualClock::new();
        let mut dispatcher = RecordingDispatcher {
            refuse: true,
            ..Default::default()
        };
        let mut lp = DetectionLoop::new(tick_period(10));
        lp.start(clock.now());
        let outcome = lp.tick(frame, &mut dispatcher);
        assert!(matches!(outcome, TickOutcome::DispatchFailed(_)));
        assert_eq!(lp.in_flight(), None);
    }
}

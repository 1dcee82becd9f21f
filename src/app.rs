//! The live detection session.
//!
//! `DetectorApp` owns every component and runs them on one thread. Timer
//! ticks, operator commands and resolved requests all arrive as discrete
//! events and are handled one at a time, so no step is ever preempted by
//! another. The only work done elsewhere is the blocking HTTP exchange,
//! which the dispatcher hands off and reports back as an `AppEvent`.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::camera::{CameraError, FacingMode, FrameSampler};
use crate::control::ControlCommand;
use crate::detect::{DetectionResult, NetworkError, ServerHealth, ServerInfo};
use crate::detection_loop::{
    Completion, CompletionOutcome, DetectionLoop, Dispatcher, RequestTicket, TickOutcome,
};
use crate::overlay::{OverlayRenderer, OverlaySurface, RenderSummary};
use crate::scheduler::Clock;
use crate::settings::{LoopConfig, SettingsError};
use crate::stats::StatsTracker;
use crate::status::{RunState, StatusBoard};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound on a single wait while the loop is stopped.
const IDLE_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum AppEvent {
    Control(ControlCommand),
    Completed(Completion),
    Shutdown,
}

impl From<Completion> for AppEvent {
    fn from(completion: Completion) -> Self {
        AppEvent::Completed(completion)
    }
}

impl From<ControlCommand> for AppEvent {
    fn from(command: ControlCommand) -> Self {
        AppEvent::Control(command)
    }
}

pub struct DetectorApp<B, S, D, C> {
    sampler: FrameSampler,
    detection: DetectionLoop,
    renderer: OverlayRenderer<S>,
    stats: StatsTracker,
    settings: LoopConfig,
    board: B,
    dispatcher: D,
    clock: C,
    facing: FacingMode,
    run_state: RunState,
    last_result: Option<DetectionResult>,
    /// Raster captured for the outstanding request.
    pending_frame: Option<(RequestTicket, RgbImage)>,
    last_health_log: Instant,
}

impl<B, S, D, C> DetectorApp<B, S, D, C>
where
    B: StatusBoard,
    S: OverlaySurface,
    D: Dispatcher,
    C: Clock,
{
    pub fn new(
        sampler: FrameSampler,
        settings: LoopConfig,
        facing: FacingMode,
        board: B,
        surface: S,
        dispatcher: D,
        clock: C,
    ) -> Self {
        let now = clock.now();
        Self {
            sampler,
            detection: DetectionLoop::new(settings.tick_period()),
            renderer: OverlayRenderer::new(surface),
            stats: StatsTracker::new(now),
            settings,
            board,
            dispatcher,
            clock,
            facing,
            run_state: RunState::Idle,
            last_result: None,
            pending_frame: None,
            last_health_log: now,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn settings(&self) -> LoopConfig {
        self.settings
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn surface(&self) -> &S {
        self.renderer.surface()
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn detection_loop(&self) -> &DetectionLoop {
        &self.detection
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.last_result.as_ref()
    }

    /// Tear down, handing back the dispatcher so it can be shut down.
    pub fn into_dispatcher(mut self) -> D {
        self.stop_camera();
        self.dispatcher
    }

    /// Initial status from the server's `/health` answer.
    pub fn apply_server_health(&mut self, health: Result<ServerHealth, NetworkError>) {
        match health {
            Ok(health) if health.is_healthy() => {
                let model = health.model.as_deref().unwrap_or("unknown");
                self.board.set_model(model);
                self.set_status(RunState::Idle, "server ready");
            }
            Ok(health) => {
                log::warn!("server reports status '{}'", health.status);
                self.set_status(RunState::Error, "server unreachable");
            }
            Err(err) => {
                log::warn!("health check failed: {}", err);
                self.set_status(RunState::Error, "server unreachable");
            }
        }
    }

    pub fn apply_server_info(&mut self, info: Result<ServerInfo, NetworkError>) {
        match info {
            Ok(info) => self.board.set_server_ip(&info.server_ip),
            Err(err) => log::debug!("server info unavailable: {}", err),
        }
    }

    /// Open the camera and start ticking. A camera failure halts the start
    /// sequence with nothing left armed.
    pub fn start_camera(&mut self) -> Result<(), CameraError> {
        if self.detection.is_running() {
            log::debug!("start ignored: already running");
            return Ok(());
        }
        self.set_status(RunState::Connecting, "starting camera");
        if let Err(err) = self.sampler.start(self.facing) {
            log::error!("camera start failed: {}", err);
            self.set_status(RunState::Error, &err.to_string());
            return Err(err);
        }
        let now = self.clock.now();
        self.stats.reset(now);
        self.detection.start(now);
        self.set_status(RunState::Active, "camera active");
        Ok(())
    }

    /// Stop ticking, release the camera and clear the overlay. An in-flight
    /// request is left to resolve; its result will be discarded.
    pub fn stop_camera(&mut self) {
        self.detection.stop();
        self.sampler.stop();
        self.renderer.clear();
        self.last_result = None;
        self.pending_frame = None;
        self.set_status(RunState::Idle, "camera stopped");
    }

    /// Stop, flip the facing mode, start again. If the new camera fails the
    /// session stays stopped on the new facing mode.
    pub fn switch_camera(&mut self) -> Result<FacingMode, CameraError> {
        self.detection.stop();
        self.renderer.clear();
        self.last_result = None;
        self.pending_frame = None;
        self.set_status(RunState::Connecting, "switching camera");

        self.sampler.stop();
        self.facing = self.facing.opposite();
        match self.sampler.start(self.facing) {
            Ok(()) => {
                let now = self.clock.now();
                self.stats.reset(now);
                self.detection.start(now);
                self.set_status(RunState::Active, "camera active");
                Ok(self.facing)
            }
            Err(err) => {
                log::error!("camera switch to {} failed: {}", self.facing, err);
                self.set_status(RunState::Error, &err.to_string());
                Err(err)
            }
        }
    }

    /// Takes effect immediately: the timer is re-armed at the new period.
    pub fn set_target_fps(&mut self, target_fps: u32) -> Result<(), SettingsError> {
        self.settings.set_target_fps(target_fps)?;
        let now = self.clock.now();
        self.detection.set_period(now, self.settings.tick_period());
        log::info!("target fps set to {}", target_fps);
        Ok(())
    }

    /// Re-renders the last result against the new threshold.
    pub fn set_confidence_percent(&mut self, percent: u32) -> Result<(), SettingsError> {
        self.settings.set_confidence_percent(percent)?;
        log::info!("confidence threshold set to {}%", percent);
        if let Some(result) = self.last_result.as_ref() {
            self.renderer
                .render(&result.detections, self.settings.confidence_threshold());
        }
        Ok(())
    }

    /// Run a tick if one is due.
    pub fn on_timer(&mut self) -> Option<TickOutcome> {
        let now = self.clock.now();
        if !self.detection.poll(now) {
            return None;
        }
        let sampler = &mut self.sampler;
        let outcome = self
            .detection
            .tick(|| sampler.capture_frame(), &mut self.dispatcher);
        match &outcome {
            TickOutcome::Dispatched(ticket) => {
                self.pending_frame = self
                    .sampler
                    .last_raster()
                    .map(|raster| (*ticket, raster.clone()));
            }
            TickOutcome::CaptureFailed(err) => log::warn!("frame capture failed: {}", err),
            TickOutcome::DispatchFailed(err) => {
                log::warn!("detect dispatch failed: {}", err);
                self.set_status(RunState::Error, "offline");
            }
            TickOutcome::SkippedInFlight => log::trace!("tick skipped: request in flight"),
            TickOutcome::SkippedNotReady => log::trace!("tick skipped: no frame yet"),
            TickOutcome::Idle => {}
        }
        Some(outcome)
    }

    /// Handle a resolved request. Returns what was rendered, if anything.
    pub fn on_completion(&mut self, completion: Completion) -> Option<RenderSummary> {
        let ticket = completion.ticket;
        let frame = match self.pending_frame.take() {
            Some((pending, frame)) if pending == ticket => Some(frame),
            other => {
                self.pending_frame = other;
                None
            }
        };

        match self.detection.complete(completion) {
            CompletionOutcome::Delivered(response) => {
                if !response.result.success {
                    log::debug!(
                        "server could not process frame: {}",
                        response.result.error.as_deref().unwrap_or("no reason given")
                    );
                    return None;
                }
                if let Some(frame) = frame.as_ref() {
                    self.renderer.set_backdrop(frame);
                }
                let summary = self.renderer.render(
                    &response.result.detections,
                    self.settings.confidence_threshold(),
                );

                let count = response.result.count();
                let now = self.clock.now();
                self.stats.record_latency(response.latency);
                if let Some(fps) = self.stats.on_tick(now, count) {
                    self.board.set_achieved_fps(fps);
                }
                self.board.set_latency(response.latency);
                self.board.set_object_count(count);
                if self.run_state != RunState::Active {
                    self.set_status(RunState::Active, "camera active");
                }
                self.last_result = Some(response.result);
                Some(summary)
            }
            CompletionOutcome::Failed(err) => {
                log::warn!("detect failed: {}", err);
                self.set_status(RunState::Error, "offline");
                None
            }
            CompletionOutcome::Discarded => {
                log::debug!("discarded result for request {}", ticket.id);
                None
            }
        }
    }

    /// Apply one event. Returns `false` once the app should exit.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Completed(completion) => {
                self.on_completion(completion);
            }
            AppEvent::Control(command) => return self.apply_command(command),
            AppEvent::Shutdown => return false,
        }
        true
    }

    fn apply_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::StartCamera => {
                // Already reported on the status board.
                let _ = self.start_camera();
            }
            ControlCommand::StopCamera => self.stop_camera(),
            ControlCommand::SwitchCamera => {
                let _ = self.switch_camera();
            }
            ControlCommand::SetFps(fps) => {
                if let Err(err) = self.set_target_fps(fps) {
                    log::warn!("{}", err);
                }
            }
            ControlCommand::SetConfidence(percent) => {
                if let Err(err) = self.set_confidence_percent(percent) {
                    log::warn!("{}", err);
                }
            }
            ControlCommand::Status => self.log_status(),
            ControlCommand::Quit => return false,
        }
        true
    }

    /// Event pump. Waits for the next event or the next tick, whichever is
    /// first, until shutdown or until every sender is gone. The camera is
    /// released before returning.
    pub fn run(&mut self, events: Receiver<AppEvent>) {
        loop {
            let now = self.clock.now();
            let wait = self
                .detection
                .until_next_tick(now)
                .unwrap_or(IDLE_WAIT)
                .min(IDLE_WAIT);
            match events.recv_timeout(wait) {
                Ok(event) => {
                    if !self.handle(event) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("event channel closed");
                    break;
                }
            }
            self.on_timer();
            self.log_health_if_due();
        }
        self.stop_camera();
    }

    fn log_health_if_due(&mut self) {
        let now = self.clock.now();
        if now.saturating_duration_since(self.last_health_log) < HEALTH_LOG_INTERVAL {
            return;
        }
        self.last_health_log = now;
        if !self.detection.is_running() {
            return;
        }
        let counters = self.detection.counters();
        log::info!(
            "loop health state={} ticks={} dispatched={} skipped_in_flight={} skipped_not_ready={} failed={} discarded={} frames={}",
            self.run_state,
            counters.ticks,
            counters.dispatched,
            counters.skipped_in_flight,
            counters.skipped_not_ready,
            counters.failed,
            counters.discarded,
            self.sampler.frames_captured()
        );
    }

    fn log_status(&self) {
        let snapshot = self.stats.snapshot();
        log::info!(
            "status={} camera={} fps_target={} fps_achieved={} confidence={}% objects={} latency={}",
            self.run_state,
            self.sampler
                .session()
                .map(|session| format!("{} {}", session.facing(), session.resolution()))
                .unwrap_or_else(|| "off".to_string()),
            self.settings.target_fps(),
            snapshot
                .achieved_fps
                .map(|fps| fps.to_string())
                .unwrap_or_else(|| "-".to_string()),
            crate::overlay::confidence_percent(self.settings.confidence_threshold()),
            snapshot.object_count,
            snapshot
                .last_latency
                .map(|latency| format!("{}ms", latency.as_millis()))
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    fn set_status(&mut self, state: RunState, message: &str) {
        self.run_state = state;
        self.board.set_status(state, message);
    }
}

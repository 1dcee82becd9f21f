use std::sync::mpsc;
use std::time::Duration;

use live_detect::camera::SyntheticConfig;
use live_detect::{
    AppEvent, CameraError, CameraSource, Completion, ControlCommand, DetectResponse,
    DetectionResult, DetectorApp, Dispatcher, EncodedImage, FacingMode, FrameSampler,
    LogStatusBoard, LogSurface, LoopConfig, ManualClock, NetworkError, RequestTicket, Resolution,
    RunState, SourceCamera, TickOutcome,
};

const PERSON_AND_DOG: &str = r#"{
    "success": true,
    "count": 2,
    "detections": [
        {"class": "person", "confidence": 0.9, "bbox": {"x1": 10, "y1": 10, "x2": 50, "y2": 80}},
        {"class": "dog", "confidence": 0.1, "bbox": {"x1": 0, "y1": 0, "x2": 5, "y2": 5}}
    ]
}"#;

/// Accepts every dispatch and remembers it; the test resolves requests by
/// hand.
#[derive(Default)]
struct RecordingDispatcher {
    sent: Vec<(RequestTicket, EncodedImage)>,
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&mut self, ticket: RequestTicket, image: EncodedImage) -> Result<(), NetworkError> {
        self.sent.push((ticket, image));
        Ok(())
    }
}

type TestApp = DetectorApp<LogStatusBoard, LogSurface, RecordingDispatcher, ManualClock>;

fn app_with(backend: SourceCamera, facing: FacingMode, clock: &ManualClock) -> TestApp {
    let sampler = FrameSampler::new(Box::new(backend), Resolution::new(160, 120), 80);
    DetectorApp::new(
        sampler,
        LoopConfig::default(),
        facing,
        LogStatusBoard::new(),
        LogSurface::new(),
        RecordingDispatcher::default(),
        clock.clone(),
    )
}

fn app(clock: &ManualClock) -> TestApp {
    app_with(SourceCamera::synthetic(), FacingMode::Environment, clock)
}

fn success(ticket: RequestTicket, body: &str, latency_ms: u64) -> Completion {
    Completion {
        ticket,
        outcome: Ok(DetectResponse {
            result: serde_json::from_str(body).expect("result json"),
            latency: Duration::from_millis(latency_ms),
        }),
    }
}

/// Advance one tick period and expect a dispatch.
fn next_dispatch(app: &mut TestApp, clock: &ManualClock) -> RequestTicket {
    clock.advance(app.settings().tick_period());
    match app.on_timer() {
        Some(TickOutcome::Dispatched(ticket)) => ticket,
        other => panic!("expected dispatch, got {:?}", other),
    }
}

#[test]
fn person_and_dog_renders_one_box_and_raw_count() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");
    assert_eq!(app.run_state(), RunState::Active);
    assert_eq!(app.board().message(), "camera active");

    let ticket = next_dispatch(&mut app, &clock);
    let (_, image) = &app.dispatcher().sent[0];
    assert_eq!((image.width(), image.height()), (160, 120));
    assert!(image.to_data_url().starts_with("data:image/jpeg;base64,"));

    let summary = app
        .on_completion(success(ticket, PERSON_AND_DOG, 42))
        .expect("rendered");
    assert_eq!(summary.drawn, 1);

    let boxes = app.surface().boxes();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].1, "person 90%");
    assert_eq!(app.surface().items().len(), 1);
    assert_eq!(app.board().object_count(), 2);
    assert_eq!(app.board().latency(), Some(Duration::from_millis(42)));
}

#[test]
fn confidence_change_rerenders_without_new_request() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");
    let ticket = next_dispatch(&mut app, &clock);
    app.on_completion(success(ticket, PERSON_AND_DOG, 30));
    assert_eq!(app.surface().boxes().len(), 1);

    app.set_confidence_percent(5).expect("threshold");
    assert_eq!(app.surface().boxes().len(), 2);
    app.set_confidence_percent(95).expect("threshold");
    assert!(app.surface().boxes().is_empty());
    assert_eq!(app.dispatcher().sent.len(), 1);

    assert!(app.set_confidence_percent(150).is_err());
    assert_eq!(app.settings().confidence_threshold(), 0.95);
}

#[test]
fn network_failure_degrades_status_and_keeps_ticking() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");

    let ticket = next_dispatch(&mut app, &clock);
    let rendered = app.on_completion(Completion {
        ticket,
        outcome: Err(NetworkError::Unreachable("connection refused".to_string())),
    });
    assert!(rendered.is_none());
    assert_eq!(app.run_state(), RunState::Error);
    assert_eq!(app.board().state(), RunState::Error);
    assert!(app.detection_loop().is_running());

    let ticket = next_dispatch(&mut app, &clock);
    assert_eq!(app.dispatcher().sent.len(), 2);
    app.on_completion(success(ticket, PERSON_AND_DOG, 25));
    assert_eq!(app.run_state(), RunState::Active);
}

#[test]
fn slow_server_never_has_two_requests_outstanding() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");
    let ticket = next_dispatch(&mut app, &clock);

    for _ in 0..5 {
        clock.advance(app.settings().tick_period());
        assert_eq!(app.on_timer(), Some(TickOutcome::SkippedInFlight));
    }
    assert_eq!(app.dispatcher().sent.len(), 1);

    app.on_completion(success(ticket, PERSON_AND_DOG, 600));
    next_dispatch(&mut app, &clock);
    assert_eq!(app.dispatcher().sent.len(), 2);
}

#[test]
fn fps_change_rearms_timer_mid_run() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");

    clock.advance_ms(40);
    app.set_target_fps(4).expect("fps");
    assert!(app.detection_loop().is_running());
    clock.advance_ms(249);
    assert_eq!(app.on_timer(), None);
    clock.advance_ms(1);
    assert!(matches!(app.on_timer(), Some(TickOutcome::Dispatched(_))));

    assert!(app.set_target_fps(0).is_err());
    assert_eq!(app.settings().target_fps(), 4);
}

#[test]
fn achieved_fps_counts_rendered_ticks() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");

    for _ in 0..10 {
        let ticket = next_dispatch(&mut app, &clock);
        app.on_completion(success(ticket, PERSON_AND_DOG, 20));
    }
    assert_eq!(app.board().achieved_fps(), Some(10));
}

#[test]
fn unprocessable_frame_is_skipped_quietly() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");
    let ticket = next_dispatch(&mut app, &clock);

    let rendered = app.on_completion(success(
        ticket,
        r#"{"success": false, "error": "Invalid image data"}"#,
        15,
    ));
    assert!(rendered.is_none());
    assert_eq!(app.run_state(), RunState::Active);
    assert!(app.last_result().is_none());
    assert_eq!(app.stats().pending_frames(), 0);
}

#[test]
fn stop_clears_overlay_and_discards_late_result() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");
    let first = next_dispatch(&mut app, &clock);
    app.on_completion(success(first, PERSON_AND_DOG, 30));
    let late = next_dispatch(&mut app, &clock);

    app.stop_camera();
    assert_eq!(app.run_state(), RunState::Idle);
    assert_eq!(app.board().message(), "camera stopped");
    assert!(app.surface().boxes().is_empty());
    assert!(app.surface().items().is_empty());
    assert!(!app.sampler().is_active());

    clock.advance_ms(500);
    assert_eq!(app.on_timer(), None);
    assert!(app.on_completion(success(late, PERSON_AND_DOG, 900)).is_none());
    assert!(app.surface().boxes().is_empty());
    assert_eq!(app.detection_loop().counters().discarded, 1);
}

#[test]
fn camera_failure_halts_start() {
    let clock = ManualClock::new();
    let backend = SourceCamera::new(
        None,
        Some(CameraSource::Synthetic(SyntheticConfig::named("back"))),
    );
    let mut app = app_with(backend, FacingMode::User, &clock);

    let err = app.start_camera().unwrap_err();
    assert!(matches!(err, CameraError::NoDevice(_)));
    assert_eq!(app.run_state(), RunState::Error);
    assert!(!app.detection_loop().is_running());
    assert!(!app.sampler().is_active());

    clock.advance_ms(1000);
    assert_eq!(app.on_timer(), None);
}

#[test]
fn failed_switch_stays_stopped_on_new_facing() {
    let clock = ManualClock::new();
    let backend = SourceCamera::new(
        None,
        Some(CameraSource::Synthetic(SyntheticConfig::named("back"))),
    );
    let mut app = app_with(backend, FacingMode::Environment, &clock);
    app.start_camera().expect("start");

    assert!(app.switch_camera().is_err());
    assert_eq!(app.facing(), FacingMode::User);
    assert!(!app.sampler().is_active());
    assert!(!app.detection_loop().is_running());
    assert_eq!(app.run_state(), RunState::Error);

    assert_eq!(app.switch_camera().expect("switch back"), FacingMode::Environment);
    assert_eq!(app.run_state(), RunState::Active);
}

#[test]
fn camera_warmup_skips_ticks_silently() {
    let clock = ManualClock::new();
    let backend = SourceCamera::new(
        None,
        Some(CameraSource::parse("stub://back?warmup=2").expect("source")),
    );
    let mut app = app_with(backend, FacingMode::Environment, &clock);
    app.start_camera().expect("start");

    for _ in 0..2 {
        clock.advance(app.settings().tick_period());
        assert_eq!(app.on_timer(), Some(TickOutcome::SkippedNotReady));
    }
    next_dispatch(&mut app, &clock);
    assert_eq!(app.run_state(), RunState::Active);
}

#[test]
fn health_check_sets_initial_status() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.apply_server_health(Err(NetworkError::Unreachable("refused".to_string())));
    assert_eq!(app.run_state(), RunState::Error);
    assert_eq!(app.board().message(), "server unreachable");

    let healthy = serde_json::from_str(r#"{"status": "healthy", "models": "YOLOv8n"}"#)
        .expect("health json");
    app.apply_server_health(Ok(healthy));
    assert_eq!(app.run_state(), RunState::Idle);
    assert!(app.board().summary().contains("model=YOLOv8n"));
}

#[test]
fn event_pump_applies_commands_until_shutdown() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    let (tx, rx) = mpsc::channel();
    tx.send(AppEvent::from(ControlCommand::StartCamera)).unwrap();
    tx.send(AppEvent::from(ControlCommand::SetFps(5))).unwrap();
    tx.send(AppEvent::from(ControlCommand::Status)).unwrap();
    tx.send(AppEvent::Shutdown).unwrap();

    app.run(rx);
    assert_eq!(app.settings().target_fps(), 5);
    assert_eq!(app.run_state(), RunState::Idle);
    assert!(!app.sampler().is_active());
    assert!(app.sampler().frames_captured() <= 1);
}

#[test]
fn empty_result_clears_previous_boxes() {
    let clock = ManualClock::new();
    let mut app = app(&clock);
    app.start_camera().expect("start");
    let ticket = next_dispatch(&mut app, &clock);
    app.on_completion(success(ticket, PERSON_AND_DOG, 30));
    assert_eq!(app.surface().boxes().len(), 1);

    let ticket = next_dispatch(&mut app, &clock);
    let result = DetectionResult::new(vec![]);
    app.on_completion(Completion {
        ticket,
        outcome: Ok(DetectResponse {
            result,
            latency: Duration::from_millis(10),
        }),
    });
    assert!(app.surface().boxes().is_empty());
    assert!(app.surface().items().is_empty());
    assert_eq!(app.board().object_count(), 0);
}

//! Live Detect
//!
//! Samples frames from a camera, sends them to a remote object-detection
//! server and draws the returned boxes over the frame that produced them.
//!
//! # Architecture
//!
//! The capture-detect-render loop keeps three properties:
//!
//! 1. **Bounded requests**: at most one detect call is outstanding. Ticks that
//!    arrive while a call is pending are dropped, never queued.
//! 2. **Fault tolerance**: a failed call degrades the status and is skipped;
//!    only an explicit stop halts the timer.
//! 3. **Frame sync**: a result is drawn against the raster it was computed
//!    from, and results from a stopped or earlier run are discarded.
//!
//! # Module Structure
//!
//! - `camera`: camera ownership and JPEG frame sampling
//! - `detect`: HTTP contract, client and the worker thread
//! - `detection_loop`: the tick state machine and in-flight guard
//! - `scheduler`: clocks and the re-armable interval timer
//! - `overlay`: confidence filtering and box/list rendering
//! - `stats`, `status`: throughput, latency and run state display
//! - `app`: the single-threaded event pump tying it together

pub mod app;
pub mod camera;
pub mod config;
pub mod control;
pub mod detect;
pub mod detection_loop;
pub mod overlay;
pub mod scheduler;
pub mod settings;
pub mod stats;
pub mod status;

pub use app::{AppEvent, DetectorApp};
pub use camera::{
    CameraBackend, CameraError, CameraSource, CaptureError, EncodedImage, FacingMode,
    FrameSampler, Resolution, SourceCamera, VideoStream,
};
pub use config::ClientConfig;
pub use control::ControlCommand;
pub use detect::{
    BoundingBox, DetectResponse, DetectWorker, Detection, DetectionClient, DetectionResult,
    NetworkError,
};
pub use detection_loop::{
    Completion, CompletionOutcome, DetectionLoop, Dispatcher, RequestTicket, TickOutcome,
};
pub use overlay::{LogSurface, OverlayRenderer, OverlaySurface, RasterSurface};
pub use scheduler::{Clock, IntervalTimer, ManualClock, SystemClock};
pub use settings::{LoopConfig, SettingsError};
pub use stats::{StatsSnapshot, StatsTracker};
pub use status::{LogStatusBoard, RunState, StatusBoard};

//! Camera ownership and frame sampling.
//!
//! `FrameSampler` is the only component that opens or closes a camera stream.
//! It holds at most one `CameraSession`; the stream handle inside the session
//! is private, so nothing outside this module can start, stop or read it.
//!
//! Sources are pluggable through `CameraBackend`:
//! - `stub://<name>` synthetic scenes (tests, demos)
//! - still images from disk (`file://` or a plain path)
//! - V4L2 devices (feature: camera-v4l2)

mod source;
mod still;
mod synthetic;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

pub use source::{CameraSource, SourceCamera};
pub use synthetic::SyntheticConfig;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const PREFERRED_WIDTH: u32 = 1280;
pub const PREFERRED_HEIGHT: u32 = 720;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera.
    User,
    /// Back camera.
    #[default]
    Environment,
}

impl FacingMode {
    pub fn opposite(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            other => Err(format!(
                "unknown facing mode '{}'; expected user or environment",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Largest resolution both sides can agree on.
    pub fn negotiate(self, available: Resolution) -> Resolution {
        Resolution::new(
            self.width.min(available.width),
            self.height.min(available.height),
        )
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera device: {0}")]
    NoDevice(String),
    #[error("camera failure: {0}")]
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera not started")]
    NotStarted,
    /// Stream is open but no frame has been presented yet.
    #[error("no frame presented yet")]
    NotReady,
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("jpeg encode failed: {0}")]
    Encode(String),
}

/// JPEG bytes ready for transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `data:image/jpeg;base64,...`, the form the server expects.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// An open video stream.
pub trait VideoStream {
    /// Negotiated resolution. Zero until the first frame is presented.
    fn resolution(&self) -> Resolution;

    /// Latest presented frame, or `None` if nothing has been presented yet.
    fn poll_frame(&mut self) -> Result<Option<RgbImage>, CameraError>;

    /// Release device resources. Called exactly once per opened stream.
    fn close(&mut self);
}

/// Something that can open a camera for a facing mode.
pub trait CameraBackend {
    fn name(&self) -> &'static str;

    fn open(
        &mut self,
        facing: FacingMode,
        preferred: Resolution,
    ) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// The live camera. Exists only between `start` and `stop`.
pub struct CameraSession {
    facing: FacingMode,
    preferred: Resolution,
    stream: Box<dyn VideoStream>,
}

impl CameraSession {
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn preferred_resolution(&self) -> Resolution {
        self.preferred
    }

    pub fn resolution(&self) -> Resolution {
        self.stream.resolution()
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("facing", &self.facing)
            .field("resolution", &self.resolution())
            .finish()
    }
}

pub struct FrameSampler {
    backend: Box<dyn CameraBackend>,
    preferred: Resolution,
    jpeg_quality: u8,
    facing: FacingMode,
    session: Option<CameraSession>,
    last_raster: Option<RgbImage>,
    frames_captured: u64,
}

impl FrameSampler {
    pub fn new(backend: Box<dyn CameraBackend>, preferred: Resolution, jpeg_quality: u8) -> Self {
        Self {
            backend,
            preferred,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            facing: FacingMode::default(),
            session: None,
            last_raster: None,
            frames_captured: 0,
        }
    }

    /// Open the camera for `facing`. On failure no session is left behind.
    pub fn start(&mut self, facing: FacingMode) -> Result<(), CameraError> {
        if self.session.is_some() {
            log::warn!("FrameSampler: start while active; releasing previous session");
            self.stop();
        }
        self.facing = facing;
        let stream = self.backend.open(facing, self.preferred)?;
        self.session = Some(CameraSession {
            facing,
            preferred: self.preferred,
            stream,
        });
        log::info!(
            "FrameSampler: {} camera opened via {} (preferred {})",
            facing,
            self.backend.name(),
            self.preferred
        );
        Ok(())
    }

    /// Release the stream. Safe to call when nothing is open.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stream.close();
            log::info!("FrameSampler: {} camera released", session.facing);
        }
        self.last_raster = None;
    }

    /// `stop` then `start` on the other camera. Not atomic: if the second
    /// step fails the sampler stays stopped on the new facing mode.
    pub fn switch_facing(&mut self) -> Result<FacingMode, CameraError> {
        let next = self.facing.opposite();
        self.stop();
        self.facing = next;
        self.start(next)?;
        Ok(next)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn session(&self) -> Option<&CameraSession> {
        self.session.as_ref()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Raster of the most recent successful capture.
    pub fn last_raster(&self) -> Option<&RgbImage> {
        self.last_raster.as_ref()
    }

    /// Draw the current frame into a buffer of the negotiated size and
    /// encode it as JPEG.
    pub fn capture_frame(&mut self) -> Result<EncodedImage, CaptureError> {
        let session = self.session.as_mut().ok_or(CaptureError::NotStarted)?;
        let Some(frame) = session.stream.poll_frame()? else {
            return Err(CaptureError::NotReady);
        };
        let target = session.stream.resolution();
        if target.is_zero() {
            return Err(CaptureError::NotReady);
        }

        let raster = if frame.dimensions() == (target.width, target.height) {
            frame
        } else {
            image::imageops::resize(&frame, target.width, target.height, FilterType::Triangle)
        };
        let bytes = encode_jpeg(&raster, self.jpeg_quality)?;
        self.frames_captured += 1;
        self.last_raster = Some(raster);
        Ok(EncodedImage::new(bytes, target.width, target.height))
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn encode_jpeg(raster: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::with_capacity(raster.as_raw().len() / 8);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        encoder
            .encode_image(raster)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }
    Ok(bytes)
}

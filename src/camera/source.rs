use std::path::PathBuf;

use url::Url;

use super::still::StillImageStream;
use super::synthetic::{SyntheticConfig, SyntheticStream};
use super::{CameraBackend, CameraError, FacingMode, Resolution, VideoStream};

/// Where a facing mode gets its pixels from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSource {
    /// `stub://<name>[?warmup=<polls>]`
    Synthetic(SyntheticConfig),
    /// `file:///path/to/frame.jpg` or a bare path.
    Still(PathBuf),
    /// `v4l2:///dev/video0`
    V4l2(String),
}

impl CameraSource {
    pub fn parse(raw: &str) -> Result<Self, CameraError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CameraError::NoDevice("empty camera source".to_string()));
        }
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Ok(CameraSource::Still(PathBuf::from(raw)))
            }
            Err(e) => {
                return Err(CameraError::Failed(format!(
                    "invalid camera source '{}': {}",
                    raw, e
                )))
            }
        };
        match url.scheme() {
            "stub" => {
                let name = url.host_str().unwrap_or("camera").to_string();
                let warmup_polls = url
                    .query_pairs()
                    .find(|(key, _)| key == "warmup")
                    .map(|(_, value)| value.parse::<u32>())
                    .transpose()
                    .map_err(|e| {
                        CameraError::Failed(format!("invalid warmup in '{}': {}", raw, e))
                    })?
                    .unwrap_or(0);
                Ok(CameraSource::Synthetic(SyntheticConfig {
                    name,
                    warmup_polls,
                    ..SyntheticConfig::default()
                }))
            }
            "file" => url
                .to_file_path()
                .map(CameraSource::Still)
                .map_err(|_| CameraError::Failed(format!("invalid file source '{}'", raw))),
            "v4l2" => Ok(CameraSource::V4l2(url.path().to_string())),
            other => Err(CameraError::Failed(format!(
                "unsupported camera scheme '{}'; expected stub, file or v4l2",
                other
            ))),
        }
    }
}

/// Backend that maps each facing mode to a configured source.
///
/// A facing mode with no source behaves like a phone without that camera.
#[derive(Clone, Debug, Default)]
pub struct SourceCamera {
    user: Option<CameraSource>,
    environment: Option<CameraSource>,
}

impl SourceCamera {
    pub fn new(user: Option<CameraSource>, environment: Option<CameraSource>) -> Self {
        Self { user, environment }
    }

    /// Synthetic cameras on both sides, presenting immediately.
    pub fn synthetic() -> Self {
        Self::new(
            Some(CameraSource::Synthetic(SyntheticConfig::named("front"))),
            Some(CameraSource::Synthetic(SyntheticConfig::named("back"))),
        )
    }

    pub fn source(&self, facing: FacingMode) -> Option<&CameraSource> {
        match facing {
            FacingMode::User => self.user.as_ref(),
            FacingMode::Environment => self.environment.as_ref(),
        }
    }
}

impl CameraBackend for SourceCamera {
    fn name(&self) -> &'static str {
        "source"
    }

    fn open(
        &mut self,
        facing: FacingMode,
        preferred: Resolution,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        let source = self
            .source(facing)
            .ok_or_else(|| CameraError::NoDevice(format!("no {} camera configured", facing)))?;
        match source {
            CameraSource::Synthetic(config) => {
                Ok(Box::new(SyntheticStream::open(config.clone(), preferred)))
            }
            CameraSource::Still(path) => Ok(Box::new(StillImageStream::open(path, preferred)?)),
            #[cfg(feature = "camera-v4l2")]
            CameraSource::V4l2(device) => {
                Ok(Box::new(super::v4l2::V4l2Stream::open(device, preferred)?))
            }
            #[cfg(not(feature = "camera-v4l2"))]
            CameraSource::V4l2(device) => Err(CameraError::NoDevice(format!(
                "{}: V4L2 capture requires the camera-v4l2 feature",
                device
            ))),
        }
    }
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::RgbImage;

use super::{CameraError, Resolution, VideoStream};

/// Presents one image from disk on every poll.
///
/// Useful for replaying a known scene against a live server. The image is
/// decoded once at open and scaled down to the preferred resolution if larger.
pub(super) struct StillImageStream {
    path: PathBuf,
    frame: Option<RgbImage>,
    negotiated: Resolution,
}

impl StillImageStream {
    pub(super) fn open(path: &Path, preferred: Resolution) -> Result<Self, CameraError> {
        std::fs::metadata(path).map_err(|e| io_to_camera_error(path, e))?;
        let image = image::open(path)
            .map_err(|e| CameraError::Failed(format!("decode {}: {}", path.display(), e)))?
            .into_rgb8();
        let native = Resolution::new(image.width(), image.height());
        let negotiated = fit_within(native, preferred);
        log::info!(
            "StillImageCamera: opened {} ({} presented at {})",
            path.display(),
            native,
            negotiated
        );
        Ok(Self {
            path: path.to_path_buf(),
            frame: Some(image),
            negotiated,
        })
    }
}

impl VideoStream for StillImageStream {
    fn resolution(&self) -> Resolution {
        if self.frame.is_some() {
            self.negotiated
        } else {
            Resolution::default()
        }
    }

    fn poll_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        Ok(self.frame.clone())
    }

    fn close(&mut self) {
        self.frame = None;
        log::info!("StillImageCamera: closed {}", self.path.display());
    }
}

fn io_to_camera_error(path: &Path, err: std::io::Error) -> CameraError {
    match err.kind() {
        ErrorKind::PermissionDenied => {
            CameraError::PermissionDenied(format!("{}: {}", path.display(), err))
        }
        ErrorKind::NotFound => CameraError::NoDevice(format!("{}: {}", path.display(), err)),
        _ => CameraError::Failed(format!("{}: {}", path.display(), err)),
    }
}

/// Scale `native` down (keeping aspect) so it fits inside `bound`.
fn fit_within(native: Resolution, bound: Resolution) -> Resolution {
    if bound.is_zero() || (native.width <= bound.width && native.height <= bound.height) {
        return native;
    }
    let scale = f64::min(
        f64::from(bound.width) / f64::from(native.width),
        f64::from(bound.height) / f64::from(native.height),
    );
    Resolution::new(
        ((f64::from(native.width) * scale).round() as u32).max(1),
        ((f64::from(native.height) * scale).round() as u32).max(1),
    )
}

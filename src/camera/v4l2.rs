//! V4L2 camera stream.
//!
//! Opens a local device node (e.g. /dev/video0), asks for RGB3 at the
//! preferred size and accepts whatever the driver negotiates.

use image::RgbImage;
use ouroboros::self_referencing;
use std::io::ErrorKind;

use super::{CameraError, Resolution, VideoStream};

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub(super) struct V4l2Stream {
    device_path: String,
    state: Option<DeviceState>,
    negotiated: Resolution,
    presented: bool,
    frame_count: u64,
}

impl V4l2Stream {
    pub(super) fn open(device_path: &str, preferred: Resolution) -> Result<Self, CameraError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(device_path).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{}: {}", device_path, e))
            }
            ErrorKind::NotFound => CameraError::NoDevice(format!("{}: {}", device_path, e)),
            _ => CameraError::Failed(format!("open {}: {}", device_path, e)),
        })?;
        let mut format = device
            .format()
            .map_err(|e| CameraError::Failed(format!("read v4l2 format: {}", e)))?;
        format.width = preferred.width;
        format.height = preferred.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    device_path,
                    err
                );
                device
                    .format()
                    .map_err(|e| CameraError::Failed(format!("read v4l2 format: {}", e)))?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(CameraError::Failed(format!(
                "{} does not offer RGB3 (got {})",
                device_path, format.fourcc
            )));
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| CameraError::Failed(format!("create v4l2 buffer stream: {}", e)))?;

        let negotiated = Resolution::new(format.width, format.height);
        log::info!("V4l2Camera: opened {} at {}", device_path, negotiated);
        Ok(Self {
            device_path: device_path.to_string(),
            state: Some(state),
            negotiated,
            presented: false,
            frame_count: 0,
        })
    }
}

impl VideoStream for V4l2Stream {
    fn resolution(&self) -> Resolution {
        if self.presented {
            self.negotiated
        } else {
            Resolution::default()
        }
    }

    fn poll_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let Resolution { width, height } = self.negotiated;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|e| CameraError::Failed(format!("capture v4l2 frame: {}", e)))?;
        let expected = (width as usize) * (height as usize) * 3;
        if pixels.len() < expected {
            log::debug!(
                "V4l2Camera: short buffer on {} ({} < {})",
                self.device_path,
                pixels.len(),
                expected
            );
            return Ok(None);
        }
        let frame = RgbImage::from_raw(width, height, pixels[..expected].to_vec());
        if frame.is_some() {
            self.presented = true;
            self.frame_count += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.state = None;
        self.presented = false;
        log::info!(
            "V4l2Camera: closed {} after {} frames",
            self.device_path,
            self.frame_count
        );
    }
}

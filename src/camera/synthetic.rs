// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests and demos
// ----------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use rand::Rng;

use super::{CameraError, Resolution, VideoStream};

/// Configuration for a synthetic camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    /// Polls that return nothing before the first frame is presented,
    /// like a real stream before its metadata arrives.
    pub warmup_polls: u32,
    /// Largest resolution the fake sensor offers.
    pub sensor: Resolution,
}

impl SyntheticConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "camera".to_string(),
            warmup_polls: 0,
            sensor: Resolution::new(1920, 1080),
        }
    }
}

pub(super) struct SyntheticStream {
    config: SyntheticConfig,
    negotiated: Resolution,
    warmup_remaining: u32,
    presented: bool,
    frame_count: u64,
}

impl SyntheticStream {
    pub(super) fn open(config: SyntheticConfig, preferred: Resolution) -> Self {
        let negotiated = preferred.negotiate(config.sensor);
        log::info!(
            "SyntheticCamera: opened {} at {} (synthetic)",
            config.name,
            negotiated
        );
        Self {
            warmup_remaining: config.warmup_polls,
            config,
            negotiated,
            presented: false,
            frame_count: 0,
        }
    }

    /// A flat background with a bright block sliding across it, plus a
    /// little sensor noise so consecutive frames never encode identically.
    fn render(&mut self) -> RgbImage {
        let Resolution { width, height } = self.negotiated;
        let mut frame = RgbImage::from_pixel(width, height, Rgb([40, 60, 80]));

        let block_w = (width / 6).max(1);
        let block_h = (height / 4).max(1);
        let span = width.saturating_sub(block_w).max(1);
        let left = ((self.frame_count * 8) % u64::from(span)) as u32;
        let top = height / 3;
        for y in top..(top + block_h).min(height) {
            for x in left..(left + block_w).min(width) {
                frame.put_pixel(x, y, Rgb([220, 200, 40]));
            }
        }

        let mut rng = rand::thread_rng();
        let specks = (width * height / 500).max(1);
        for _ in 0..specks {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            let v: u8 = rng.gen();
            frame.put_pixel(x, y, Rgb([v, v, v]));
        }
        frame
    }
}

impl VideoStream for SyntheticStream {
    fn resolution(&self) -> Resolution {
        if self.presented {
            self.negotiated
        } else {
            Resolution::default()
        }
    }

    fn poll_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(None);
        }
        if self.negotiated.is_zero() {
            return Err(CameraError::Failed(format!(
                "{}: no usable resolution",
                self.config.name
            )));
        }
        self.presented = true;
        self.frame_count += 1;
        Ok(Some(self.render()))
    }

    fn close(&mut self) {
        log::info!(
            "SyntheticCamera: closed {} after {} frames",
            self.config.name,
            self.frame_count
        );
        self.presented = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_down_to_sensor_size() {
        let config = SyntheticConfig {
            sensor: Resolution::new(640, 480),
            ..SyntheticConfig::named("small")
        };
        let mut stream = SyntheticStream::open(config, Resolution::new(1280, 720));
        assert!(stream.resolution().is_zero());
        let frame = stream.poll_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(stream.resolution(), Resolution::new(640, 480));
    }

    #[test]
    fn warmup_delays_first_frame() {
        let config = SyntheticConfig {
            warmup_polls: 1,
            sensor: Resolution::new(32, 32),
            ..SyntheticConfig::default()
        };
        let mut stream = SyntheticStream::open(config, Resolution::new(32, 32));
        assert!(stream.poll_frame().unwrap().is_none());
        assert!(stream.poll_frame().unwrap().is_some());
    }

    #[test]
    fn frames_change_between_polls() {
        let config = SyntheticConfig {
            sensor: Resolution::new(96, 64),
            ..SyntheticConfig::default()
        };
        let mut stream = SyntheticStream::open(config, Resolution::new(96, 64));
        let first = stream.poll_frame().unwrap().unwrap();
        let second = stream.poll_frame().unwrap().unwrap();
        assert_ne!(first.as_raw(), second.as_raw());
    }
}

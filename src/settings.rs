//! Live loop settings.
//!
//! `LoopConfig` is the only mutable state shared between the user controls and
//! the loop. Changing `target_fps` requires the scheduler to be re-armed; the
//! confidence threshold is read by the renderer on every render.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_TARGET_FPS: u32 = 10;
pub const MAX_TARGET_FPS: u32 = 60;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("target fps must be within 1..={max}, got {0}", max = MAX_TARGET_FPS)]
    InvalidTargetFps(u32),
    #[error("confidence threshold must be within [0, 1], got {0}")]
    InvalidConfidence(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopConfig {
    target_fps: u32,
    confidence_threshold: f32,
}

impl LoopConfig {
    pub fn new(target_fps: u32, confidence_threshold: f32) -> Result<Self, SettingsError> {
        validate_fps(target_fps)?;
        validate_confidence(confidence_threshold)?;
        Ok(Self {
            target_fps,
            confidence_threshold,
        })
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Tick period for the current rate (`1000 / target_fps` ms).
    pub fn tick_period(&self) -> Duration {
        tick_period(self.target_fps)
    }

    pub fn set_target_fps(&mut self, target_fps: u32) -> Result<(), SettingsError> {
        validate_fps(target_fps)?;
        self.target_fps = target_fps;
        Ok(())
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<(), SettingsError> {
        validate_confidence(threshold)?;
        self.confidence_threshold = threshold;
        Ok(())
    }

    /// Integer percent form used by the confidence selector.
    pub fn set_confidence_percent(&mut self, percent: u32) -> Result<(), SettingsError> {
        self.set_confidence_threshold(percent as f32 / 100.0)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Period between ticks for a given rate. Microsecond precision keeps
/// rates like 3 fps at 333.333 ms instead of truncating to whole ms.
pub fn tick_period(target_fps: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(target_fps.max(1)))
}

fn validate_fps(target_fps: u32) -> Result<(), SettingsError> {
    if target_fps == 0 || target_fps > MAX_TARGET_FPS {
        return Err(SettingsError::InvalidTargetFps(target_fps));
    }
    Ok(())
}

fn validate_confidence(threshold: f32) -> Result<(), SettingsError> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(SettingsError::InvalidConfidence(threshold));
    }
    Ok(())
}

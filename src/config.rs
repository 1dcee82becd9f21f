use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{FacingMode, DEFAULT_JPEG_QUALITY, PREFERRED_HEIGHT, PREFERRED_WIDTH};
use crate::settings::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_TARGET_FPS, MAX_TARGET_FPS};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
const DEFAULT_USER_SOURCE: &str = "stub://front";
const DEFAULT_ENVIRONMENT_SOURCE: &str = "stub://back";

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    server: Option<ServerConfigFile>,
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    url: Option<String>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    target_fps: Option<u32>,
    confidence: Option<f32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    facing: Option<FacingMode>,
    width: Option<u32>,
    height: Option<u32>,
    user_source: Option<String>,
    environment_source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub request_timeout: Duration,
    pub target_fps: u32,
    pub confidence_threshold: f32,
    pub jpeg_quality: u8,
    pub camera: CameraSettings,
    /// Where the annotated frame is written on every render, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
    /// Source for the front camera; empty means none.
    pub user_source: String,
    /// Source for the back camera; empty means none.
    pub environment_source: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_file(ClientConfigFile::default())
    }
}

impl ClientConfig {
    /// Defaults, then the file named by `LIVE_DETECT_CONFIG`, then
    /// `LIVE_DETECT_*` overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, but with an explicit config file in place of
    /// `LIVE_DETECT_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let server = file.server.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            server_url: server
                .url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            request_timeout: Duration::from_millis(
                server
                    .request_timeout_ms
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
            target_fps: detection.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            confidence_threshold: detection
                .confidence
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            jpeg_quality: detection.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            camera: CameraSettings {
                facing: camera.facing.unwrap_or_default(),
                width: camera.width.unwrap_or(PREFERRED_WIDTH),
                height: camera.height.unwrap_or(PREFERRED_HEIGHT),
                user_source: camera
                    .user_source
                    .unwrap_or_else(|| DEFAULT_USER_SOURCE.to_string()),
                environment_source: camera
                    .environment_source
                    .unwrap_or_else(|| DEFAULT_ENVIRONMENT_SOURCE.to_string()),
            },
            snapshot_path: file.overlay.and_then(|overlay| overlay.snapshot_path),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("LIVE_DETECT_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = url.trim().to_string();
            }
        }
        if let Ok(fps) = std::env::var("LIVE_DETECT_FPS") {
            self.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_FPS must be an integer"))?;
        }
        if let Ok(confidence) = std::env::var("LIVE_DETECT_CONFIDENCE") {
            self.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(facing) = std::env::var("LIVE_DETECT_FACING") {
            self.camera.facing = facing
                .parse()
                .map_err(|e: String| anyhow!("LIVE_DETECT_FACING: {}", e))?;
        }
        if let Ok(timeout) = std::env::var("LIVE_DETECT_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("LIVE_DETECT_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.request_timeout = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("LIVE_DETECT_SNAPSHOT") {
            if !path.trim().is_empty() {
                self.snapshot_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        let url = url::Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server url must be http or https, got '{}'",
                self.server_url
            ));
        }
        if !(1..=MAX_TARGET_FPS).contains(&self.target_fps) {
            return Err(anyhow!(
                "target fps must be within 1..={}, got {}",
                MAX_TARGET_FPS,
                self.target_fps
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be within 1..=100, got {}",
                self.jpeg_quality
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        self.camera.user_source = self.camera.user_source.trim().to_string();
        self.camera.environment_source = self.camera.environment_source.trim().to_string();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

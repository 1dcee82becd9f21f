//! Wire types for the inference endpoint.
//!
//! These mirror the server's JSON bodies field for field. `DetectRequest` is
//! the only request body; everything else is parsed from responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /detect`: a single data-URL string.
#[derive(Debug, Serialize)]
pub struct DetectRequest<'a> {
    pub image: &'a str,
}

/// Box corners in source-frame pixels. `x1 <= x2` and `y1 <= y2` are expected
/// but not checked here; the renderer tolerates violations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Parsed body of a `/detect` response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub success: bool,
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Server-reported count. Falls back to `detections.len()` when absent.
    #[serde(default)]
    count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            success: true,
            count: Some(detections.len()),
            detections,
            image_size: None,
            error: None,
        }
    }

    /// Raw object count as reported by the server (pre-filter).
    pub fn count(&self) -> usize {
        self.count.unwrap_or(self.detections.len())
    }

    /// Detections at or above `threshold`, in server order.
    pub fn filtered(&self, threshold: f32) -> impl Iterator<Item = &Detection> {
        self.detections
            .iter()
            .filter(move |det| det.confidence >= threshold)
    }
}

/// `GET /health`. Some servers spell the model field `models`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServerHealth {
    pub status: String,
    #[serde(default, alias = "models")]
    pub model: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
}

impl ServerHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// `GET /`. Only `server_ip` is used; the rest is informational.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServerInfo {
    pub server_ip: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// `GET /classes`: class id to class name.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ClassList {
    pub classes: BTreeMap<u32, String>,
    #[serde(default)]
    pub total: Option<usize>,
}

impl ClassList {
    pub fn len(&self) -> usize {
        self.total.unwrap_or(self.classes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

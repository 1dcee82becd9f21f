mod client;
mod result;
mod worker;

pub use client::{DetectResponse, DetectionClient, NetworkError, DEFAULT_CONNECT_TIMEOUT};
pub use result::{
    BoundingBox, ClassList, DetectRequest, Detection, DetectionResult, ImageSize, ServerHealth,
    ServerInfo,
};
pub use worker::DetectWorker;

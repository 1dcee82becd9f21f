//! HTTP client for the inference server.
//!
//! One `detect` call is one request/response exchange. There is no retry:
//! a failed tick is dropped and the next tick starts fresh.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use super::result::{ClassList, DetectRequest, DetectionResult, ServerHealth, ServerInfo};
use crate::camera::EncodedImage;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Transport failure: offline, DNS, refused, timed out.
    #[error("server unreachable: {0}")]
    Unreachable(String),
    /// Non-success status or a body that does not match the contract.
    #[error("bad response: {0}")]
    BadResponse(String),
}

/// A parsed detection result plus the measured round trip.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectResponse {
    pub result: DetectionResult,
    /// Dispatch to fully parsed body.
    pub latency: Duration,
}

#[derive(Clone, Debug)]
pub struct DetectionClient {
    agent: ureq::Agent,
    base_url: Url,
}

impl DetectionClient {
    /// `request_timeout` bounds the whole exchange, so a hung server turns
    /// into `Unreachable` instead of holding the in-flight slot forever.
    pub fn new(server_url: &str, request_timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(server_url).context("parse server url")?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported server scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build();
        Ok(Self { agent, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST the frame to `/detect` and parse the result.
    pub fn detect(&self, image: &EncodedImage) -> Result<DetectResponse, NetworkError> {
        let url = self.endpoint("detect")?;
        let data_url = image.to_data_url();
        let body = serde_json::to_string(&DetectRequest { image: &data_url })
            .map_err(|e| NetworkError::BadResponse(format!("encode request: {}", e)))?;

        let started = Instant::now();
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(map_call_error)?;
        let result: DetectionResult = read_json(response)?;
        let latency = started.elapsed();

        log::debug!(
            "detect: {} objects in {}ms ({} bytes sent)",
            result.count(),
            latency.as_millis(),
            image.len()
        );
        Ok(DetectResponse { result, latency })
    }

    pub fn health(&self) -> Result<ServerHealth, NetworkError> {
        self.get_json("health")
    }

    pub fn server_info(&self) -> Result<ServerInfo, NetworkError> {
        self.get_json("")
    }

    pub fn classes(&self) -> Result<ClassList, NetworkError> {
        self.get_json("classes")
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkError> {
        let url = self.endpoint(path)?;
        let response = self.agent.get(url.as_str()).call().map_err(map_call_error)?;
        read_json(response)
    }

    fn endpoint(&self, path: &str) -> Result<Url, NetworkError> {
        self.base_url
            .join(path)
            .map_err(|e| NetworkError::Unreachable(format!("invalid endpoint '{}': {}", path, e)))
    }
}

fn map_call_error(err: ureq::Error) -> NetworkError {
    match err {
        ureq::Error::Status(code, response) => NetworkError::BadResponse(format!(
            "http status {} {}",
            code,
            response.status_text()
        )),
        ureq::Error::Transport(transport) => NetworkError::Unreachable(transport.to_string()),
    }
}

fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T, NetworkError> {
    let body = response
        .into_string()
        .map_err(|e| NetworkError::Unreachable(format!("read response body: {}", e)))?;
    serde_json::from_str(&body)
        .map_err(|e| NetworkError::BadResponse(format!("malformed payload: {}", e)))
}

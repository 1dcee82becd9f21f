//! Run state and the status display capability.

use std::fmt;
use std::time::Duration;

/// Camera + server readiness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Connecting,
    Active,
    /// Camera failed to start or the server is unreachable ("offline").
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Connecting => "connecting",
            RunState::Active => "active",
            RunState::Error => "offline",
        };
        f.write_str(s)
    }
}

/// Where status and statistics are shown.
pub trait StatusBoard {
    fn set_status(&mut self, state: RunState, message: &str);

    fn set_latency(&mut self, latency: Duration);

    fn set_achieved_fps(&mut self, fps: u32);

    fn set_object_count(&mut self, count: usize);

    fn set_model(&mut self, _model: &str) {}

    fn set_server_ip(&mut self, _server_ip: &str) {}
}

/// Status board backed by the `log` facade.
///
/// Status transitions and throughput updates are logged at info; per-tick
/// latency and counts only at debug.
#[derive(Debug, Default)]
pub struct LogStatusBoard {
    state: RunState,
    message: String,
    latency: Option<Duration>,
    achieved_fps: Option<u32>,
    object_count: usize,
    model: Option<String>,
    server_ip: Option<String>,
}

impl LogStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn achieved_fps(&self) -> Option<u32> {
        self.achieved_fps
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// One-line summary for the `status` command.
    pub fn summary(&self) -> String {
        format!(
            "status={} ({}) fps={} latency={} objects={} model={} server={}",
            self.state,
            self.message,
            self.achieved_fps
                .map(|fps| fps.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.latency
                .map(|l| format!("{}ms", l.as_millis()))
                .unwrap_or_else(|| "-".to_string()),
            self.object_count,
            self.model.as_deref().unwrap_or("-"),
            self.server_ip.as_deref().unwrap_or("-"),
        )
    }
}

impl StatusBoard for LogStatusBoard {
    fn set_status(&mut self, state: RunState, message: &str) {
        if self.state == state && self.message == message {
            return;
        }
        match state {
            RunState::Error => log::warn!("status: {} - {}", state, message),
            _ => log::info!("status: {} - {}", state, message),
        }
        self.state = state;
        self.message = message.to_string();
    }

    fn set_latency(&mut self, latency: Duration) {
        log::debug!("latency: {}ms", latency.as_millis());
        self.latency = Some(latency);
    }

    fn set_achieved_fps(&mut self, fps: u32) {
        if self.achieved_fps != Some(fps) {
            log::info!("achieved fps: {}", fps);
        }
        self.achieved_fps = Some(fps);
    }

    fn set_object_count(&mut self, count: usize) {
        log::debug!("objects: {}", count);
        self.object_count = count;
    }

    fn set_model(&mut self, model: &str) {
        log::info!("model: {}", model);
        self.model = Some(model.to_string());
    }

    fn set_server_ip(&mut self, server_ip: &str) {
        log::info!("server ip: {}", server_ip);
        self.server_ip = Some(server_ip.to_string());
    }
}

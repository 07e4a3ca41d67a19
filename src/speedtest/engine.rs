//! Contract between the bridge and the wrapped speed-test engine.
//!
//! The engine performs the actual measurement and reports each phase through
//! an [`EngineListener`]. Callbacks may arrive on any thread.

use crate::bridge::config::{ServerDescriptor, StartRequest};
use std::sync::Arc;
use thiserror::Error;

/// Status an engine reports when a run cannot start or continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid settings")]
    InvalidSettings,
    #[error("Invalid servers")]
    InvalidServers,
    #[error("In progress")]
    InProgress,
    #[error("Failed")]
    Failed,
    #[error("Not saved")]
    NotSaved,
    #[error("Cancelled")]
    Cancelled,
    #[error("{0}")]
    Fatal(String),
    #[error("{0}")]
    Interrupted(String),
}

/// Instantaneous or final throughput.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Speed {
    pub mbps: f64,
}

impl Speed {
    pub fn from_mbps(mbps: f64) -> Self {
        Self { mbps }
    }
}

/// Final figures of a completed run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineResult {
    pub server: ServerDescriptor,
    pub latency_ms: i64,
    pub jitter_ms: i64,
    pub download: Speed,
    pub upload: Speed,
    pub download_transferred_mb: f64,
    pub upload_transferred_mb: f64,
    pub connection_type: String,
    pub device_info: String,
    pub ip: Option<String>,
    pub isp: Option<String>,
    pub packet_loss_percent: Option<f64>,
}

/// One method per phase event. The bridge's session is the only implementer.
pub trait EngineListener: Send + Sync {
    fn on_servers_received(&self, servers: &[ServerDescriptor]);
    fn on_server_selected(&self, server: &ServerDescriptor, latency_ms: i64, jitter_ms: i64);
    fn on_download_started(&self);
    fn on_download_progress(&self, progress: f64, speed: Speed, transferred_mb: f64);
    fn on_download_finished(&self, speed: Speed);
    fn on_upload_started(&self);
    fn on_upload_progress(&self, progress: f64, speed: Speed, transferred_mb: f64);
    fn on_upload_finished(&self, speed: Speed);
    fn on_finished(&self, result: EngineResult);
    fn on_warning(&self, message: &str);
    fn on_error(&self, error: EngineError);
}

/// Handle to an in-flight run.
pub trait EngineRun: Send {
    /// Asks the engine to halt immediately.
    fn stop(&mut self) -> Result<(), EngineError>;
}

/// A speed-test engine.
///
/// `start` must return before delivering any callback for the run it starts;
/// callbacks are expected from the engine's own background context.
pub trait Engine: Send + Sync {
    fn start(
        &self,
        request: StartRequest,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn EngineRun>, EngineError>;
}

pub mod engine;
pub mod simulated;

use serde::{Serialize, Serializer};

/// Phase of a test run as reported to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestStatus {
    #[default]
    Idle,
    Started,
    Pinging,
    Downloading,
    Uploading,
    Finished,
    Stopped,
}

impl TestStatus {
    /// Human-readable label carried on the event stream.
    pub fn label(self) -> &'static str {
        match self {
            TestStatus::Idle => "Idle",
            TestStatus::Started => "Speed test started",
            TestStatus::Pinging => "Ping",
            TestStatus::Downloading => "Download",
            TestStatus::Uploading => "Upload",
            TestStatus::Finished => "Speed test finished",
            TestStatus::Stopped => "Speed test stopped",
        }
    }

    /// Position in the run; phases only move forward within one run.
    pub fn rank(self) -> u8 {
        match self {
            TestStatus::Idle => 0,
            TestStatus::Started => 1,
            TestStatus::Pinging => 2,
            TestStatus::Downloading => 3,
            TestStatus::Uploading => 4,
            TestStatus::Finished | TestStatus::Stopped => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Finished | TestStatus::Stopped)
    }
}

impl Serialize for TestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Aggregated, emit-ready view of the current run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSnapshot {
    pub status: TestStatus,
    pub server: String,
    pub ping: i64,
    pub jitter: i64,
    #[serde(rename = "downloadSpeed")]
    pub download_speed_mbps: f64,
    #[serde(rename = "uploadSpeed")]
    pub upload_speed_mbps: f64,
    #[serde(rename = "currentSpeed")]
    pub current_speed_mbps: f64,
    pub percent: u8,
    pub connection_type: String,
    pub server_info: String,
    pub device_info: String,
    pub download_transferred_mb: f64,
    pub upload_transferred_mb: f64,
    pub ip: Option<String>,
    pub isp: Option<String>,
    #[serde(rename = "packetLoss")]
    pub packet_loss_percent: Option<f64>,
    pub warning: Option<String>,
}

impl ResultSnapshot {
    /// Baseline values every run starts from.
    pub fn baseline() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::baseline();
    }
}

/// Converts engine progress in `[0, 1]` to a whole percentage.
///
/// Engines can report values outside that range while a phase is starting or
/// finishing, so the result is clamped to `0..=100`.
pub fn progress_percent(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    (progress * 100.0).floor().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_clamps() {
        assert_eq!(progress_percent(0.0), 0);
        assert_eq!(progress_percent(0.426), 42);
        assert_eq!(progress_percent(0.999), 99);
        assert_eq!(progress_percent(1.0), 100);
        assert_eq!(progress_percent(1.7), 100);
        assert_eq!(progress_percent(-0.3), 0);
        assert_eq!(progress_percent(f64::NAN), 0);
        assert_eq!(progress_percent(f64::INFINITY), 100);
    }

    #[test]
    fn test_baseline_is_zeroed() {
        let snapshot = ResultSnapshot::baseline();
        assert_eq!(snapshot.status, TestStatus::Idle);
        assert_eq!(snapshot.ping, 0);
        assert_eq!(snapshot.download_speed_mbps, 0.0);
        assert_eq!(snapshot.percent, 0);
        assert!(snapshot.ip.is_none());
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let mut snapshot = ResultSnapshot::baseline();
        snapshot.status = TestStatus::Downloading;
        snapshot.current_speed_mbps = 12.5;
        snapshot.percent = 40;

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["status"], "Download");
        assert_eq!(value["currentSpeed"], 12.5);
        assert_eq!(value["percent"], 40);
        assert_eq!(value["downloadTransferredMb"], 0.0);
        assert!(value["packetLoss"].is_null());
    }

    #[test]
    fn test_rank_orders_phases() {
        assert!(TestStatus::Started.rank() < TestStatus::Pinging.rank());
        assert!(TestStatus::Downloading.rank() < TestStatus::Uploading.rank());
        assert!(TestStatus::Stopped.is_terminal());
        assert!(!TestStatus::Uploading.is_terminal());
    }
}

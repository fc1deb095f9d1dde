//! Core camera status and telemetry types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Session status as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraStatus {
    PoweredOff,
    Idle,
    Streaming,
}

impl CameraStatus {
    /// Wire representation, e.g. `POWERED_OFF`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::PoweredOff => "POWERED_OFF",
            CameraStatus::Idle => "IDLE",
            CameraStatus::Streaming => "STREAMING",
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSource {
    Live,
    Simulated,
}

/// Per-frame sample statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub min: u16,
    pub max: u16,
    pub mean: f64,
}

/// Automatic exposure control state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AecState {
    pub enabled: bool,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
    pub num_frames_to_average: Option<u32>,
}

/// Automatic gain control state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgcState {
    pub enabled: bool,
    pub min_target_value: Option<f64>,
    pub max_target_value: Option<f64>,
}

/// Best-effort snapshot of ancillary sensor state.
///
/// Every field is independently optional. Unknown fields serialize as `null`
/// so the UI always sees the same schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraInfo {
    pub temperature_c: Option<f64>,
    pub integration_time_ms: Option<f64>,
    pub frame_rate: Option<f64>,
    pub aec: Option<AecState>,
    pub agc: Option<AgcState>,
    pub nuc_enabled: Option<bool>,
    pub bpr_enabled: Option<bool>,
}

impl CameraInfo {
    /// Snapshot with every field unknown.
    pub fn unknown() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&CameraStatus::PoweredOff).unwrap();
        assert_eq!(json, "\"POWERED_OFF\"");
        let parsed: CameraStatus = serde_json::from_str("\"STREAMING\"").unwrap();
        assert_eq!(parsed, CameraStatus::Streaming);
        assert_eq!(CameraStatus::Idle.to_string(), "IDLE");
    }

    #[test]
    fn test_unknown_info_keeps_fixed_schema() {
        let value = serde_json::to_value(CameraInfo::unknown()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "temperature_c",
            "integration_time_ms",
            "frame_rate",
            "aec",
            "agc",
            "nuc_enabled",
            "bpr_enabled",
        ] {
            assert!(obj.get(key).unwrap().is_null(), "{key} should be null");
        }
    }

    #[test]
    fn test_frame_source_lowercase() {
        assert_eq!(
            serde_json::to_string(&FrameSource::Simulated).unwrap(),
            "\"simulated\""
        );
    }
}

//! JSON messages exchanged over the camera control websocket.
//!
//! Inbound: one [`CommandRequest`] per text frame.
//! Outbound: one [`ServerMessage`] per text frame, discriminated by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{CameraInfo, CameraStatus, FrameSource, FrameStats};

/// A client command, e.g. `{"command": "get_frames", "params": {"num_frames": 3}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CommandRequest {
    /// Build a request with no parameters.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Map::new(),
        }
    }

    /// Build a request from a command name and a JSON object of parameters.
    ///
    /// Non-object values are ignored and produce an empty parameter map.
    pub fn with_params(command: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            command: command.into(),
            params,
        }
    }
}

/// Messages sent from the server to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StatusUpdate {
        status: CameraStatus,
        camera_info: CameraInfo,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
    ImageFrame {
        /// Base64 encoded JPEG
        data: String,
        source: FrameSource,
        histogram: Vec<u32>,
        stats: FrameStats,
        camera_info: CameraInfo,
    },
}

impl ServerMessage {
    pub fn log(message: impl Into<String>) -> Self {
        ServerMessage::Log {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn status(status: CameraStatus, camera_info: CameraInfo) -> Self {
        ServerMessage::StatusUpdate {
            status,
            camera_info,
        }
    }

    /// Short name of the message kind, matching the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::StatusUpdate { .. } => "status_update",
            ServerMessage::Log { .. } => "log",
            ServerMessage::Error { .. } => "error",
            ServerMessage::ImageFrame { .. } => "image_frame",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_default_to_empty_object() {
        let req: CommandRequest = serde_json::from_str(r#"{"command": "power_on"}"#).unwrap();
        assert_eq!(req.command, "power_on");
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_params_are_preserved() {
        let req: CommandRequest =
            serde_json::from_str(r#"{"command": "get_frames", "params": {"num_frames": 3}}"#)
                .unwrap();
        assert_eq!(req.params.get("num_frames"), Some(&json!(3)));
    }

    #[test]
    fn test_status_update_shape() {
        let msg = ServerMessage::status(CameraStatus::Idle, CameraInfo::unknown());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "status_update");
        assert_eq!(value["status"], "IDLE");
        assert!(value["camera_info"].is_object());
    }

    #[test]
    fn test_image_frame_shape() {
        let msg = ServerMessage::ImageFrame {
            data: "AAAA".to_string(),
            source: FrameSource::Live,
            histogram: vec![0; crate::HISTOGRAM_BUCKETS],
            stats: FrameStats {
                min: 1,
                max: 2,
                mean: 1.5,
            },
            camera_info: CameraInfo::unknown(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "image_frame");
        assert_eq!(value["source"], "live");
        assert_eq!(value["histogram"].as_array().unwrap().len(), 128);
        assert_eq!(value["stats"]["max"], 2);
        assert_eq!(msg.kind(), "image_frame");
    }

    #[test]
    fn test_log_and_error_round_trip() {
        let text = serde_json::to_string(&ServerMessage::error("boom")).unwrap();
        assert_eq!(text, r#"{"type":"error","message":"boom"}"#);
        let parsed: ServerMessage = serde_json::from_str(r#"{"type":"log","message":"hi"}"#).unwrap();
        assert_eq!(parsed, ServerMessage::log("hi"));
    }
}

#![allow(dead_code)]

use std::time::Duration;

use camera_server::metrics::ServerMetrics;
use camera_server::outbox::Outbox;
use camera_server::{Session, SessionConfig, StreamTuning};
use serde_json::{json, Value};
use shared::camera_interface::mock::MockSensor;
use shared_wasm::{CameraStatus, CommandRequest, ServerMessage};
use tokio::sync::mpsc;

pub const OUTBOX_CAPACITY: usize = 4096;

/// Tuning with short delays so tests run quickly.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        jpeg_quality: 80,
        buffer_capacity: 4,
        tuning: StreamTuning {
            failure_backoff: Duration::from_millis(5),
            restart_pause: Duration::from_millis(20),
            idle_poll: Duration::from_millis(5),
            consumer_wait: Duration::from_millis(10),
            get_frames_delay: Duration::from_millis(1),
            calibration_step_delay: Duration::from_millis(1),
            ..StreamTuning::default()
        },
    }
}

pub fn session_with(sensor: MockSensor) -> (Session, mpsc::Receiver<ServerMessage>) {
    session_with_config(sensor, fast_config())
}

pub fn session_with_config(
    sensor: MockSensor,
    config: SessionConfig,
) -> (Session, mpsc::Receiver<ServerMessage>) {
    let (session, rx, _) = session_with_metrics(sensor, config);
    (session, rx)
}

/// Session plus a handle on its metrics registry.
pub fn session_with_metrics(
    sensor: MockSensor,
    config: SessionConfig,
) -> (Session, mpsc::Receiver<ServerMessage>, ServerMetrics) {
    let (outbox, rx) = Outbox::channel(OUTBOX_CAPACITY);
    let metrics = ServerMetrics::new().unwrap();
    let session = Session::new(Box::new(sensor), outbox, config, metrics.clone());
    (session, rx, metrics)
}

pub fn request(command: &str, params: Value) -> CommandRequest {
    CommandRequest::with_params(command, params)
}

pub async fn run(session: &mut Session, command: &str) {
    run_with(session, command, json!({})).await;
}

pub async fn run_with(session: &mut Session, command: &str, params: Value) {
    camera_server::commands::handle_command(session, request(command, params))
        .await
        .unwrap();
}

/// Everything queued so far.
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Receive until `count` image frames have arrived, returning all messages seen.
pub async fn wait_for_frames(
    rx: &mut mpsc::Receiver<ServerMessage>,
    count: usize,
    timeout: Duration,
) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    while frames(&messages) < count {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(message)) => messages.push(message),
            _ => break,
        }
    }
    messages
}

pub fn statuses(messages: &[ServerMessage]) -> Vec<CameraStatus> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::StatusUpdate { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

pub fn errors(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn logs(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Log { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn frames(messages: &[ServerMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::ImageFrame { .. }))
        .count()
}

//! Per-connection camera session.
//!
//! A [`Session`] owns the hardware handle, the tracked [`CameraStatus`] and
//! the running stream, if any. Legal transitions:
//!
//! | From        | Command      | To          |
//! |-------------|--------------|-------------|
//! | POWERED_OFF | power_on     | IDLE        |
//! | IDLE        | power_off    | POWERED_OFF |
//! | STREAMING   | power_off    | POWERED_OFF |
//! | IDLE        | start_stream | STREAMING   |
//! | STREAMING   | stop_stream  | IDLE        |
//!
//! Anything else is a state violation and leaves the state unchanged.

pub mod calibration;

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use shared::calibration::CalibrationDataset;
use shared::camera_interface::{CameraError, SensorCapabilities, SensorInterface};
use shared::image_proc::FrameEncoder;
use shared_wasm::{CameraInfo, CameraStatus, FrameSource};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{CommandError, CommandResult};
use crate::info::collect_camera_info;
use crate::metrics::ServerMetrics;
use crate::outbox::Outbox;
use crate::passthrough::PassthroughRegistry;
use crate::stream::consumer::image_message;
use crate::stream::{SharedSensor, StreamHandle};

/// Session state shared with the streaming workers.
pub struct SessionContext {
    pub(crate) sensor: SharedSensor,
    pub(crate) capabilities: SensorCapabilities,
    pub(crate) source: FrameSource,
    pub(crate) outbox: Outbox,
    pub(crate) encoder: FrameEncoder,
    pub(crate) config: SessionConfig,
    pub(crate) metrics: ServerMetrics,
    state: Mutex<CameraStatus>,
}

impl SessionContext {
    fn tracked_state(&self) -> CameraStatus {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, status: CameraStatus) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Current status, recomputed from the hardware where possible.
    ///
    /// While streaming the session is authoritative. Otherwise the driver's
    /// power report wins when it has one.
    pub async fn current_status(&self) -> CameraStatus {
        let tracked = self.tracked_state();
        if tracked == CameraStatus::Streaming
            || !self.capabilities.contains(SensorCapabilities::POWER_STATE)
        {
            return tracked;
        }

        let status = match self.sensor.lock().await.is_powered() {
            Some(true) => CameraStatus::Idle,
            Some(false) => CameraStatus::PoweredOff,
            None => tracked,
        };
        if status != tracked {
            self.set_state(status);
        }
        status
    }

    /// Fresh telemetry snapshot.
    pub async fn camera_info(&self) -> CameraInfo {
        let sensor = self.sensor.lock().await;
        collect_camera_info(&**sensor, self.capabilities)
    }

    /// Send a `status_update` with the recomputed status.
    pub async fn send_status(&self) -> CommandResult<CameraStatus> {
        let status = self.current_status().await;
        let camera_info = self.camera_info().await;
        self.outbox.status(status, camera_info).await?;
        Ok(status)
    }
}

/// Camera session for one client connection.
pub struct Session {
    ctx: Arc<SessionContext>,
    stream: Option<StreamHandle>,
    calibration: CalibrationDataset,
    passthrough: PassthroughRegistry,
}

impl Session {
    /// Wrap a freshly opened sensor. Capabilities are read once here.
    pub fn new(
        sensor: Box<dyn SensorInterface>,
        outbox: Outbox,
        config: SessionConfig,
        metrics: ServerMetrics,
    ) -> Self {
        let capabilities = sensor.capabilities();
        let source = sensor.source();
        info!(
            "Session opened on {} sensor with capabilities {:?}",
            sensor.name(),
            capabilities
        );

        let ctx = SessionContext {
            sensor: Arc::new(tokio::sync::Mutex::new(sensor)),
            capabilities,
            source,
            outbox,
            encoder: FrameEncoder::new(config.jpeg_quality),
            config,
            metrics,
            state: Mutex::new(CameraStatus::PoweredOff),
        };

        Self {
            ctx: Arc::new(ctx),
            stream: None,
            calibration: CalibrationDataset::new(),
            passthrough: PassthroughRegistry::with_defaults(),
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.ctx.outbox
    }

    pub fn capabilities(&self) -> SensorCapabilities {
        self.ctx.capabilities
    }

    pub fn passthrough(&self) -> &PassthroughRegistry {
        &self.passthrough
    }

    pub async fn status(&self) -> CameraStatus {
        self.ctx.current_status().await
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn power_on(&mut self) -> CommandResult {
        if self.ctx.current_status().await != CameraStatus::PoweredOff {
            return Err(CommandError::state(
                "Cannot power on, camera is already powered.",
            ));
        }

        {
            let mut sensor = self.ctx.sensor.lock().await;
            sensor.perform_power_up()?;
            sensor.apply_default_bias()?;
        }
        self.ctx.set_state(CameraStatus::Idle);

        self.ctx
            .outbox
            .log("Camera power-up sequence performed.")
            .await?;
        self.ctx.send_status().await?;
        Ok(())
    }

    pub async fn power_off(&mut self) -> CommandResult {
        let status = self.ctx.current_status().await;
        if status == CameraStatus::PoweredOff {
            return Err(CommandError::state(
                "Cannot power off, camera is already powered off.",
            ));
        }
        if status == CameraStatus::Streaming {
            // Straight to POWERED_OFF, no intermediate IDLE report
            self.halt_stream(false).await;
        }

        self.ctx.sensor.lock().await.perform_power_down()?;
        self.ctx.set_state(CameraStatus::PoweredOff);

        self.ctx
            .outbox
            .log("Camera power-down sequence performed.")
            .await?;
        self.ctx.send_status().await?;
        Ok(())
    }

    pub async fn start_stream(&mut self) -> CommandResult {
        if self.ctx.current_status().await != CameraStatus::Idle {
            return Err(CommandError::state(
                "Cannot start stream, camera is not idle.",
            ));
        }

        self.ctx.sensor.lock().await.start()?;
        self.ctx.set_state(CameraStatus::Streaming);
        self.ctx.outbox.log("Stream started.").await?;
        self.ctx.send_status().await?;

        match StreamHandle::spawn(self.ctx.clone()) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.halt_stream(false).await;
                self.ctx.send_status().await?;
                Err(CameraError::HardwareError(format!("failed to launch frame producer: {e}")).into())
            }
        }
    }

    pub async fn stop_stream(&mut self) -> CommandResult {
        if self.ctx.current_status().await != CameraStatus::Streaming {
            return Err(CommandError::state(
                "Cannot stop stream, camera is not streaming.",
            ));
        }
        self.halt_stream(true).await;
        self.ctx.outbox.log("Stream stopped.").await?;
        Ok(())
    }

    /// Leave STREAMING: stop both workers, then the hardware stream.
    ///
    /// With `report_status` the delivery task sends the resulting status,
    /// otherwise the caller reports it.
    async fn halt_stream(&mut self, report_status: bool) {
        self.ctx.set_state(CameraStatus::Idle);
        if let Some(stream) = self.stream.take() {
            stream.stop(report_status).await;
        }
        if let Err(e) = self.ctx.sensor.lock().await.stop() {
            warn!("Hardware stream stop failed: {}", e);
        }
    }

    pub async fn get_status(&mut self) -> CommandResult {
        let status = self.ctx.send_status().await?;
        self.ctx
            .outbox
            .log(format!("Camera status is {status}."))
            .await
    }

    /// Capture `num_frames` frames on demand and send them one by one.
    pub async fn get_frames(&mut self, num_frames: usize) -> CommandResult {
        if self.ctx.current_status().await == CameraStatus::PoweredOff {
            return Err(CommandError::state(
                "Cannot get frames, camera is powered off.",
            ));
        }
        let limit = self.ctx.config.tuning.max_frames_per_request;
        if num_frames > limit {
            return Err(CommandError::invalid_params(
                "get_frames",
                format!("num_frames must be at most {limit}"),
            ));
        }

        let sensor = self.ctx.sensor.clone();
        let frames = tokio::task::spawn_blocking(move || sensor.blocking_lock().get_frames(num_frames))
            .await
            .map_err(|e| CameraError::HardwareError(format!("capture task failed: {e}")))??;

        self.ctx
            .outbox
            .log(format!("Captured {} frames.", frames.len()))
            .await?;

        for frame in &frames {
            let camera_info = self.ctx.camera_info().await;
            match image_message(&self.ctx.encoder, self.ctx.source, frame, camera_info) {
                Ok(message) => {
                    self.ctx.outbox.send(message).await?;
                    self.ctx.metrics.frames_delivered.inc();
                }
                Err(e) => {
                    self.ctx.metrics.encoding_failures.inc();
                    warn!("Dropping frame {}: {}", frame.sequence(), e);
                }
            }
            tokio::time::sleep(self.ctx.config.tuning.get_frames_delay).await;
        }
        Ok(())
    }

    pub async fn set_dac_voltage(&mut self, channel: u8, voltage: f64) -> CommandResult {
        self.ctx
            .sensor
            .lock()
            .await
            .set_dac_voltage(channel, voltage)?;
        self.ctx
            .outbox
            .log(format!("DAC channel {channel} set to {voltage} V."))
            .await
    }

    /// Run a registered passthrough command and log its result.
    pub async fn run_passthrough(
        &mut self,
        command: &str,
        params: Map<String, Value>,
    ) -> CommandResult {
        let result = {
            let mut sensor = self.ctx.sensor.lock().await;
            self.passthrough.call(&mut **sensor, command, &params)?
        };
        let params = Value::Object(params);
        self.ctx
            .outbox
            .log(format!(
                "Executed '{command}' with params: {params}. Result: {}",
                truncate_result(&result.to_string())
            ))
            .await
    }

    /// Tear down any stream when the connection ends.
    pub async fn shutdown(&mut self) {
        if self.ctx.tracked_state() == CameraStatus::Streaming || self.stream.is_some() {
            info!("Stopping stream for closing connection.");
            self.halt_stream(true).await;
        }
    }
}

const RESULT_PREVIEW_CHARS: usize = 200;

fn truncate_result(result: &str) -> String {
    match result.char_indices().nth(RESULT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &result[..cut]),
        None => result.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_result() {
        assert_eq!(truncate_result("true"), "true");
        let long = "x".repeat(250);
        let truncated = truncate_result(&long);
        assert_eq!(truncated.len(), 203);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_result(&"y".repeat(200)), "y".repeat(200));
    }
}

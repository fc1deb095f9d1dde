//! Best-effort snapshot of ancillary sensor telemetry.
//!
//! Each field is read independently. A field the sensor does not advertise is
//! never queried, and a failed read only blanks that one field.

use shared::camera_interface::{CameraResult, SensorCapabilities, SensorInterface};
use shared_wasm::CameraInfo;
use tracing::debug;

/// Read every advertised telemetry field from the sensor.
pub fn collect_camera_info(
    sensor: &dyn SensorInterface,
    capabilities: SensorCapabilities,
) -> CameraInfo {
    CameraInfo {
        temperature_c: probe(capabilities, SensorCapabilities::TEMPERATURE, "temperature", || {
            sensor.temperature_c()
        }),
        integration_time_ms: probe(
            capabilities,
            SensorCapabilities::INTEGRATION_TIME,
            "integration_time",
            || sensor.integration_time_ms(),
        ),
        frame_rate: probe(capabilities, SensorCapabilities::FRAME_RATE, "frame_rate", || {
            sensor.frame_rate()
        }),
        aec: probe(capabilities, SensorCapabilities::AEC, "aec", || sensor.aec_state()),
        agc: probe(capabilities, SensorCapabilities::AGC, "agc", || sensor.agc_state()),
        nuc_enabled: probe(capabilities, SensorCapabilities::NUC, "nuc", || {
            sensor.nuc_enabled()
        }),
        bpr_enabled: probe(capabilities, SensorCapabilities::BPR, "bpr", || {
            sensor.bpr_enabled()
        }),
    }
}

fn probe<T>(
    capabilities: SensorCapabilities,
    required: SensorCapabilities,
    field: &str,
    read: impl FnOnce() -> CameraResult<T>,
) -> Option<T> {
    if !capabilities.contains(required) {
        return None;
    }
    match read() {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Telemetry field {} unavailable: {}", field, e);
            None
        }
    }
}

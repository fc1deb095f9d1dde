//! Hardware sensor interface.
//!
//! [`SensorInterface`] is the only way the server talks to a camera. Required
//! methods cover the power/stream lifecycle and frame acquisition; everything
//! else is optional and advertised up front through [`SensorCapabilities`],
//! so callers never have to probe a driver by trial and error.

pub mod mock;
pub mod ring_buffer;

use std::time::SystemTime;

use bitflags::bitflags;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use shared_wasm::{AecState, AgcState, FrameSource};
use thiserror::Error;

use crate::calibration::CalibrationCoefficients;

pub use ring_buffer::{BufferReadError, BufferReadResult, FrameRingBuffer};

/// Substrings (lowercased) in driver error messages that mean the driver must
/// be re-armed with `prepare_read` before the next acquisition.
const REINIT_PATTERNS: &[&str] = &["prepareread", "prepare_read", "reinit"];

/// Errors reported by sensor drivers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Frame capture failed: {0}")]
    CaptureError(String),
    #[error("Driver requires reinitialization: {0}")]
    ReinitRequired(String),
    #[error("Camera is not powered")]
    NotPowered,
    #[error("Camera stream is not running")]
    NotRunning,
    #[error("Operation '{0}' is not supported by this camera")]
    Unsupported(&'static str),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Camera initialization failed: {0}")]
    InitError(String),
    #[error("Hardware error: {0}")]
    HardwareError(String),
}

impl CameraError {
    /// True when the driver asked to be re-armed before reading again.
    pub fn requires_reinit(&self) -> bool {
        match self {
            CameraError::ReinitRequired(_) => true,
            CameraError::CaptureError(msg) | CameraError::HardwareError(msg) => {
                let lower = msg.to_ascii_lowercase();
                REINIT_PATTERNS.iter().any(|p| lower.contains(p))
            }
            _ => false,
        }
    }
}

pub type CameraResult<T> = Result<T, CameraError>;

bitflags! {
    /// Optional features a sensor driver supports.
    ///
    /// Reported once by [`SensorInterface::capabilities`] when the handle is
    /// created and cached by the session afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SensorCapabilities: u32 {
        const TEMPERATURE = 1 << 0;
        const INTEGRATION_TIME = 1 << 1;
        const FRAME_RATE = 1 << 2;
        const AEC = 1 << 3;
        const AGC = 1 << 4;
        const NUC = 1 << 5;
        const BPR = 1 << 6;
        /// Driver exposes a `prepare_read` reinitialization hook
        const PREPARE_READ = 1 << 7;
        /// Driver can report whether it is powered
        const POWER_STATE = 1 << 8;
        const CALIBRATION_FLASH = 1 << 9;
        const REGISTER_ACCESS = 1 << 10;
    }
}

impl SensorCapabilities {
    /// Capabilities that feed the per-message session info snapshot.
    pub fn telemetry() -> Self {
        Self::TEMPERATURE
            | Self::INTEGRATION_TIME
            | Self::FRAME_RATE
            | Self::AEC
            | Self::AGC
            | Self::NUC
            | Self::BPR
    }
}

/// One unprocessed sample grid from the sensor.
///
/// Immutable after creation; ownership moves from the acquisition thread to the
/// delivery task through the frame buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    image: Array2<u16>,
    sequence: u64,
    captured_at: SystemTime,
}

impl RawFrame {
    pub fn new(image: Array2<u16>, sequence: u64, captured_at: SystemTime) -> Self {
        Self {
            image,
            sequence,
            captured_at,
        }
    }

    /// Build a frame stamped with the current time.
    pub fn now(image: Array2<u16>, sequence: u64) -> Self {
        Self::new(image, sequence, SystemTime::now())
    }

    pub fn image(&self) -> &Array2<u16> {
        &self.image
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// (rows, cols)
    pub fn dimensions(&self) -> (usize, usize) {
        self.image.dim()
    }

    pub fn into_image(self) -> Array2<u16> {
        self.image
    }
}

/// Automatic exposure control limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AecConfig {
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
    pub num_frames_to_average: Option<u32>,
}

/// Automatic gain control targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgcConfig {
    pub min_target_value: Option<f64>,
    pub max_target_value: Option<f64>,
}

/// Hardware camera driver.
///
/// All methods are blocking. Only the lifecycle and acquisition methods are
/// required; optional features default to [`CameraError::Unsupported`] and
/// must be advertised through [`SensorInterface::capabilities`] when
/// implemented.
pub trait SensorInterface: Send {
    /// Human readable driver name for logs.
    fn name(&self) -> &str;

    /// Whether frames come from real hardware or a simulator.
    fn source(&self) -> FrameSource;

    /// Optional features implemented by this driver.
    fn capabilities(&self) -> SensorCapabilities {
        SensorCapabilities::empty()
    }

    fn is_running(&self) -> bool;

    /// Power state if the driver can report it (see [`SensorCapabilities::POWER_STATE`]).
    fn is_powered(&self) -> Option<bool> {
        None
    }

    fn perform_power_up(&mut self) -> CameraResult<()>;

    fn perform_power_down(&mut self) -> CameraResult<()>;

    /// Start the hardware stream.
    fn start(&mut self) -> CameraResult<()>;

    /// Stop the hardware stream.
    fn stop(&mut self) -> CameraResult<()>;

    /// Acquire `num_frames` frames, blocking until they are available.
    fn get_frames(&mut self, num_frames: usize) -> CameraResult<Vec<RawFrame>>;

    /// Re-arm the readout path after a driver error.
    fn prepare_read(&mut self) -> CameraResult<()> {
        Err(CameraError::Unsupported("prepare_read"))
    }

    /// Load the default detector bias configuration after power-up.
    fn apply_default_bias(&mut self) -> CameraResult<()> {
        Ok(())
    }

    fn set_dac_voltage(&mut self, _channel: u8, _voltage: f64) -> CameraResult<()> {
        Err(CameraError::Unsupported("set_dac_voltage"))
    }

    // --- Telemetry -----------------------------------------------------------

    fn temperature_c(&self) -> CameraResult<f64> {
        Err(CameraError::Unsupported("temperature"))
    }

    fn integration_time_ms(&self) -> CameraResult<f64> {
        Err(CameraError::Unsupported("integration_time"))
    }

    /// Frames per second the sensor is configured for.
    fn frame_rate(&self) -> CameraResult<f64> {
        Err(CameraError::Unsupported("frame_rate"))
    }

    fn aec_state(&self) -> CameraResult<AecState> {
        Err(CameraError::Unsupported("aec_state"))
    }

    fn agc_state(&self) -> CameraResult<AgcState> {
        Err(CameraError::Unsupported("agc_state"))
    }

    fn nuc_enabled(&self) -> CameraResult<bool> {
        Err(CameraError::Unsupported("nuc_state"))
    }

    fn bpr_enabled(&self) -> CameraResult<bool> {
        Err(CameraError::Unsupported("bpr_state"))
    }

    // --- Configuration -------------------------------------------------------

    /// Integration time in 10 ns units.
    fn set_integration_time(&mut self, _integration_time: u32) -> CameraResult<()> {
        Err(CameraError::Unsupported("set_integration_time"))
    }

    fn enable_nuc(&mut self, _enable: bool) -> CameraResult<()> {
        Err(CameraError::Unsupported("enable_nuc"))
    }

    fn enable_bpr(&mut self, _enable: bool) -> CameraResult<()> {
        Err(CameraError::Unsupported("enable_bpr"))
    }

    fn enable_aec(&mut self, _enable: bool) -> CameraResult<()> {
        Err(CameraError::Unsupported("enable_aec"))
    }

    fn enable_agc(&mut self, _enable: bool) -> CameraResult<()> {
        Err(CameraError::Unsupported("enable_agc"))
    }

    fn configure_aec(&mut self, _config: &AecConfig) -> CameraResult<()> {
        Err(CameraError::Unsupported("configure_aec"))
    }

    fn configure_agc(&mut self, _config: &AgcConfig) -> CameraResult<()> {
        Err(CameraError::Unsupported("configure_agc"))
    }

    fn set_column_sorting(&mut self, _enable: bool) -> CameraResult<()> {
        Err(CameraError::Unsupported("set_column_sorting"))
    }

    fn set_row_mirroring(&mut self, _enable: bool) -> CameraResult<()> {
        Err(CameraError::Unsupported("set_row_mirroring"))
    }

    // --- Register and flash access --------------------------------------------

    fn read_fpga_register(&mut self, _address: u32) -> CameraResult<u32> {
        Err(CameraError::Unsupported("read_fpga_register"))
    }

    fn write_fpga_registers(&mut self, _addresses: &[u32], _values: &[u32]) -> CameraResult<()> {
        Err(CameraError::Unsupported("write_fpga_registers"))
    }

    fn read_device(&mut self, _address: u32) -> CameraResult<u32> {
        Err(CameraError::Unsupported("read_device"))
    }

    fn write_device(&mut self, _address: u32, _data: u32) -> CameraResult<()> {
        Err(CameraError::Unsupported("write_device"))
    }

    fn read_flash(&mut self, _start_address: u32, _number_of_words: usize) -> CameraResult<Vec<u32>> {
        Err(CameraError::Unsupported("read_flash"))
    }

    // --- Calibration -----------------------------------------------------------

    /// Run the vendor calibration script, returning its progress messages.
    fn run_calibration_script(&mut self) -> CameraResult<Vec<String>> {
        Err(CameraError::Unsupported("run_calibration_script"))
    }

    /// Persist non-uniformity coefficients into the given flash slot.
    fn write_calibration(
        &mut self,
        _memory_slot: u32,
        _coefficients: &CalibrationCoefficients,
    ) -> CameraResult<()> {
        Err(CameraError::Unsupported("write_calibration_to_flash"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_reinit_pattern_detection() {
        assert!(CameraError::ReinitRequired("x".into()).requires_reinit());
        assert!(
            CameraError::CaptureError("readout stalled, call prepareRead() first".into())
                .requires_reinit()
        );
        assert!(CameraError::HardwareError("REINIT needed".into()).requires_reinit());
        assert!(!CameraError::CaptureError("timeout".into()).requires_reinit());
        assert!(!CameraError::NotPowered.requires_reinit());
    }

    #[test]
    fn test_raw_frame_accessors() {
        let frame = RawFrame::now(Array2::from_elem((3, 4), 7u16), 42);
        assert_eq!(frame.sequence(), 42);
        assert_eq!(frame.dimensions(), (3, 4));
        assert_eq!(frame.image()[[2, 3]], 7);
    }

    #[test]
    fn test_telemetry_capabilities() {
        let telemetry = SensorCapabilities::telemetry();
        assert!(telemetry.contains(SensorCapabilities::TEMPERATURE));
        assert!(!telemetry.contains(SensorCapabilities::PREPARE_READ));
    }
}

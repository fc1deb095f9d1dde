//! Deterministic in-memory sensor for tests.
//!
//! Frames are a simple ramp offset by the sequence number. Failures can be
//! scripted through a [`MockProbe`], which stays usable after the sensor itself
//! has been moved into a session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ndarray::Array2;
use shared_wasm::{AecState, AgcState, FrameSource};

use super::{
    AecConfig, AgcConfig, CameraError, CameraResult, RawFrame, SensorCapabilities,
    SensorInterface,
};
use crate::calibration::CalibrationCoefficients;

#[derive(Debug, Default)]
struct MockShared {
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    prepare_read_calls: AtomicUsize,
    capture_calls: AtomicUsize,
    frames_captured: AtomicUsize,
    dac_writes: AtomicUsize,
    flash_writes: AtomicUsize,
    fail_start: AtomicBool,
    fail_temperature: AtomicBool,
    paused: AtomicBool,
    running_checks: AtomicUsize,
    scripted_failures: Mutex<VecDeque<CameraError>>,
}

/// Handle for inspecting and scripting a [`MockSensor`] from outside.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    shared: Arc<MockShared>,
}

impl MockProbe {
    pub fn start_calls(&self) -> usize {
        self.shared.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.shared.stop_calls.load(Ordering::SeqCst)
    }

    pub fn prepare_read_calls(&self) -> usize {
        self.shared.prepare_read_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> usize {
        self.shared.capture_calls.load(Ordering::SeqCst)
    }

    pub fn frames_captured(&self) -> usize {
        self.shared.frames_captured.load(Ordering::SeqCst)
    }

    pub fn dac_writes(&self) -> usize {
        self.shared.dac_writes.load(Ordering::SeqCst)
    }

    pub fn flash_writes(&self) -> usize {
        self.shared.flash_writes.load(Ordering::SeqCst)
    }

    /// How many times `is_running()` has been polled.
    pub fn running_checks(&self) -> usize {
        self.shared.running_checks.load(Ordering::SeqCst)
    }

    /// Make `is_running()` report false while the stream stays started.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::SeqCst);
    }

    /// Make the next `count` acquisitions fail with `error`.
    pub fn fail_next_captures(&self, count: usize, error: CameraError) {
        let mut queue = self
            .shared
            .scripted_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.extend(std::iter::repeat(error).take(count));
    }

    /// Make every subsequent `start()` fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.shared.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make the temperature readout fail.
    pub fn set_fail_temperature(&self, fail: bool) {
        self.shared.fail_temperature.store(fail, Ordering::SeqCst);
    }

    fn next_failure(&self) -> Option<CameraError> {
        self.shared
            .scripted_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// Mock sensor with scripted failures and call counters.
pub struct MockSensor {
    rows: usize,
    cols: usize,
    frame_rate: f64,
    capture_delay: Duration,
    source: FrameSource,
    capabilities: SensorCapabilities,
    powered: bool,
    running: bool,
    sequence: u64,
    nuc: bool,
    bpr: bool,
    aec: AecState,
    agc: AgcState,
    integration_time: u32,
    probe: MockProbe,
}

impl MockSensor {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            frame_rate: 30.0,
            capture_delay: Duration::ZERO,
            source: FrameSource::Simulated,
            capabilities: SensorCapabilities::all(),
            powered: false,
            running: false,
            sequence: 0,
            nuc: false,
            bpr: false,
            aec: AecState::default(),
            agc: AgcState::default(),
            integration_time: 500_000,
            probe: MockProbe::default(),
        }
    }

    /// Frame rate reported through telemetry.
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Time each acquisition blocks for.
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn with_capabilities(mut self, capabilities: SensorCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_source(mut self, source: FrameSource) -> Self {
        self.source = source;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    fn make_frame(&mut self) -> RawFrame {
        let seq = self.sequence;
        self.sequence += 1;
        let cols = self.cols;
        let image = Array2::from_shape_fn((self.rows, self.cols), |(r, c)| {
            ((seq as usize + r * cols + c) % 16384) as u16
        });
        RawFrame::now(image, seq)
    }
}

impl SensorInterface for MockSensor {
    fn name(&self) -> &str {
        "mock"
    }

    fn source(&self) -> FrameSource {
        self.source
    }

    fn capabilities(&self) -> SensorCapabilities {
        self.capabilities
    }

    fn is_running(&self) -> bool {
        let shared = &self.probe.shared;
        shared.running_checks.fetch_add(1, Ordering::SeqCst);
        self.running && !shared.paused.load(Ordering::SeqCst)
    }

    fn is_powered(&self) -> Option<bool> {
        self.capabilities
            .contains(SensorCapabilities::POWER_STATE)
            .then_some(self.powered)
    }

    fn perform_power_up(&mut self) -> CameraResult<()> {
        self.powered = true;
        Ok(())
    }

    fn perform_power_down(&mut self) -> CameraResult<()> {
        self.powered = false;
        self.running = false;
        Ok(())
    }

    fn start(&mut self) -> CameraResult<()> {
        self.probe.shared.start_calls.fetch_add(1, Ordering::SeqCst);
        if !self.powered {
            return Err(CameraError::NotPowered);
        }
        if self.probe.shared.fail_start.load(Ordering::SeqCst) {
            return Err(CameraError::HardwareError("start refused".to_string()));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> CameraResult<()> {
        self.probe.shared.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running = false;
        Ok(())
    }

    fn get_frames(&mut self, num_frames: usize) -> CameraResult<Vec<RawFrame>> {
        self.probe
            .shared
            .capture_calls
            .fetch_add(1, Ordering::SeqCst);

        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }
        if !self.powered {
            return Err(CameraError::NotPowered);
        }
        if let Some(error) = self.probe.next_failure() {
            return Err(error);
        }

        let frames: Vec<RawFrame> = (0..num_frames).map(|_| self.make_frame()).collect();
        self.probe
            .shared
            .frames_captured
            .fetch_add(frames.len(), Ordering::SeqCst);
        Ok(frames)
    }

    fn prepare_read(&mut self) -> CameraResult<()> {
        self.probe
            .shared
            .prepare_read_calls
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_dac_voltage(&mut self, channel: u8, voltage: f64) -> CameraResult<()> {
        if !(0.0..=5.0).contains(&voltage) {
            return Err(CameraError::InvalidParameter(format!(
                "DAC {channel} voltage {voltage} out of range"
            )));
        }
        self.probe.shared.dac_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn temperature_c(&self) -> CameraResult<f64> {
        if self.probe.shared.fail_temperature.load(Ordering::SeqCst) {
            return Err(CameraError::HardwareError("thermistor read failed".into()));
        }
        Ok(21.5)
    }

    fn integration_time_ms(&self) -> CameraResult<f64> {
        Ok(self.integration_time as f64 * 1e-5)
    }

    fn frame_rate(&self) -> CameraResult<f64> {
        Ok(self.frame_rate)
    }

    fn aec_state(&self) -> CameraResult<AecState> {
        Ok(self.aec.clone())
    }

    fn agc_state(&self) -> CameraResult<AgcState> {
        Ok(self.agc.clone())
    }

    fn nuc_enabled(&self) -> CameraResult<bool> {
        Ok(self.nuc)
    }

    fn bpr_enabled(&self) -> CameraResult<bool> {
        Ok(self.bpr)
    }

    fn set_integration_time(&mut self, integration_time: u32) -> CameraResult<()> {
        self.integration_time = integration_time;
        Ok(())
    }

    fn enable_nuc(&mut self, enable: bool) -> CameraResult<()> {
        self.nuc = enable;
        Ok(())
    }

    fn enable_bpr(&mut self, enable: bool) -> CameraResult<()> {
        self.bpr = enable;
        Ok(())
    }

    fn enable_aec(&mut self, enable: bool) -> CameraResult<()> {
        self.aec.enabled = enable;
        Ok(())
    }

    fn enable_agc(&mut self, enable: bool) -> CameraResult<()> {
        self.agc.enabled = enable;
        Ok(())
    }

    fn configure_aec(&mut self, config: &AecConfig) -> CameraResult<()> {
        self.aec.lower_limit = config.lower_limit.or(self.aec.lower_limit);
        self.aec.upper_limit = config.upper_limit.or(self.aec.upper_limit);
        self.aec.num_frames_to_average = config
            .num_frames_to_average
            .or(self.aec.num_frames_to_average);
        Ok(())
    }

    fn configure_agc(&mut self, config: &AgcConfig) -> CameraResult<()> {
        self.agc.min_target_value = config.min_target_value.or(self.agc.min_target_value);
        self.agc.max_target_value = config.max_target_value.or(self.agc.max_target_value);
        Ok(())
    }

    fn read_fpga_register(&mut self, address: u32) -> CameraResult<u32> {
        Ok(address & 0xFF)
    }

    fn run_calibration_script(&mut self) -> CameraResult<Vec<String>> {
        Ok(vec!["Mock calibration step complete.".to_string()])
    }

    fn write_calibration(
        &mut self,
        _memory_slot: u32,
        _coefficients: &CalibrationCoefficients,
    ) -> CameraResult<()> {
        self.probe.shared.flash_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

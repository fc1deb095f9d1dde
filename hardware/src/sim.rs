//! Simulated SWIR sensor.
//!
//! Produces 640x480 frames of uniform noise in `[4000, 12000)` on top of a
//! diagonal gradient rising to 2000 counts, paced to the configured frame rate.
//! Register reads return random bytes unless the register was written first.
//! Feature toggles are stored and reported back through telemetry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::calibration::CalibrationCoefficients;
use shared::camera_interface::{
    AecConfig, AgcConfig, CameraError, CameraResult, RawFrame, SensorCapabilities,
    SensorInterface,
};
use shared_wasm::{AecState, AgcState, FrameSource};
use tracing::{debug, info};

/// Noise floor and ceiling (exclusive) in counts
const NOISE_RANGE: std::ops::Range<u16> = 4000..12000;
/// Gradient added per axis at the far edge
const GRADIENT_PER_AXIS: f64 = 1000.0;
/// Words reserved per calibration flash slot
const FLASH_SLOT_WORDS: u32 = 0x10_0000;
const DAC_CHANNELS: u8 = 8;
const DAC_MAX_VOLTS: f64 = 5.0;

/// Simulated sensor configuration
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub rows: usize,
    pub cols: usize,
    pub frame_rate: f64,
    /// Integration time in 10 ns units
    pub integration_time: u32,
    pub temperature_c: f64,
    /// Sleep so that frames arrive no faster than `frame_rate`
    pub emulate_timing: bool,
    /// Fixed RNG seed for reproducible frames
    pub seed: Option<u64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            rows: 480,
            cols: 640,
            frame_rate: 30.0,
            integration_time: 500_000,
            temperature_c: -40.0,
            emulate_timing: true,
            seed: None,
        }
    }
}

pub struct SimulatedSensor {
    config: SimulatedConfig,
    rng: StdRng,
    gradient: Array2<u16>,
    powered: bool,
    running: bool,
    sequence: u64,
    next_frame_at: Option<Instant>,
    integration_time: u32,
    aec: AecState,
    agc: AgcState,
    nuc: bool,
    bpr: bool,
    column_sorting: bool,
    row_mirroring: bool,
    dac: HashMap<u8, f64>,
    fpga_registers: HashMap<u32, u32>,
    device_registers: HashMap<u32, u32>,
    flash: HashMap<u32, u32>,
}

impl SimulatedSensor {
    pub fn new(config: SimulatedConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let gradient = diagonal_gradient(config.rows, config.cols);
        info!(
            "Initialized simulated sensor {}x{} @ {} fps",
            config.cols, config.rows, config.frame_rate
        );

        Self {
            integration_time: config.integration_time,
            config,
            rng,
            gradient,
            powered: false,
            running: false,
            sequence: 0,
            next_frame_at: None,
            aec: AecState::default(),
            agc: AgcState::default(),
            nuc: false,
            bpr: false,
            column_sorting: false,
            row_mirroring: false,
            dac: HashMap::new(),
            fpga_registers: HashMap::new(),
            device_registers: HashMap::new(),
            flash: HashMap::new(),
        }
    }

    pub fn column_sorting(&self) -> bool {
        self.column_sorting
    }

    pub fn row_mirroring(&self) -> bool {
        self.row_mirroring
    }

    pub fn dac_voltage(&self, channel: u8) -> Option<f64> {
        self.dac.get(&channel).copied()
    }

    fn frame_period(&self) -> Duration {
        if self.config.frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.config.frame_rate)
        } else {
            Duration::ZERO
        }
    }

    /// Block until the next frame slot, like a sensor reading out at a fixed rate.
    fn wait_for_frame_slot(&mut self) {
        if !self.config.emulate_timing {
            return;
        }
        let now = Instant::now();
        let due = self.next_frame_at.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_frame_at = Some(due.max(now) + self.frame_period());
    }

    fn generate_frame(&mut self) -> RawFrame {
        self.wait_for_frame_slot();

        let rng = &mut self.rng;
        let mut image = self.gradient.clone();
        image.mapv_inplace(|g| g + rng.random_range(NOISE_RANGE));
        if self.row_mirroring {
            image.invert_axis(ndarray::Axis(1));
        }

        let seq = self.sequence;
        self.sequence += 1;
        RawFrame::now(image, seq)
    }
}

fn diagonal_gradient(rows: usize, cols: usize) -> Array2<u16> {
    let step = |n: usize| {
        if n > 1 {
            GRADIENT_PER_AXIS / (n - 1) as f64
        } else {
            0.0
        }
    };
    let (row_step, col_step) = (step(rows), step(cols));
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        (r as f64 * row_step + c as f64 * col_step).round() as u16
    })
}

impl SensorInterface for SimulatedSensor {
    fn name(&self) -> &str {
        "simulated"
    }

    fn source(&self) -> FrameSource {
        FrameSource::Simulated
    }

    fn capabilities(&self) -> SensorCapabilities {
        SensorCapabilities::all()
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn is_powered(&self) -> Option<bool> {
        Some(self.powered)
    }

    fn perform_power_up(&mut self) -> CameraResult<()> {
        if !self.powered {
            info!("Simulating power ON.");
            self.powered = true;
        }
        Ok(())
    }

    fn perform_power_down(&mut self) -> CameraResult<()> {
        if self.powered {
            info!("Simulating power OFF.");
            self.powered = false;
            self.running = false;
            self.next_frame_at = None;
        }
        Ok(())
    }

    fn start(&mut self) -> CameraResult<()> {
        if !self.powered {
            return Err(CameraError::NotPowered);
        }
        if !self.running {
            info!("Simulating stream START.");
            self.running = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> CameraResult<()> {
        if self.running {
            info!("Simulating stream STOP.");
            self.running = false;
            self.next_frame_at = None;
        }
        Ok(())
    }

    fn get_frames(&mut self, num_frames: usize) -> CameraResult<Vec<RawFrame>> {
        if !self.powered {
            return Err(CameraError::NotPowered);
        }
        debug!("Simulating get {} frames.", num_frames);
        Ok((0..num_frames).map(|_| self.generate_frame()).collect())
    }

    fn prepare_read(&mut self) -> CameraResult<()> {
        debug!("Sim: prepare read");
        self.next_frame_at = None;
        Ok(())
    }

    fn set_dac_voltage(&mut self, channel: u8, voltage: f64) -> CameraResult<()> {
        if channel >= DAC_CHANNELS {
            return Err(CameraError::InvalidParameter(format!(
                "DAC channel {channel} does not exist"
            )));
        }
        if !(0.0..=DAC_MAX_VOLTS).contains(&voltage) {
            return Err(CameraError::InvalidParameter(format!(
                "DAC voltage {voltage} outside 0..={DAC_MAX_VOLTS} V"
            )));
        }
        info!("Sim: set DAC {} to {}V.", channel, voltage);
        self.dac.insert(channel, voltage);
        Ok(())
    }

    fn temperature_c(&self) -> CameraResult<f64> {
        Ok(self.config.temperature_c)
    }

    fn integration_time_ms(&self) -> CameraResult<f64> {
        // 10 ns units
        Ok(self.integration_time as f64 * 1e-5)
    }

    fn frame_rate(&self) -> CameraResult<f64> {
        Ok(self.config.frame_rate)
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
        info!(
            "Simulating set integration time to {} (10ns units).",
            integration_time
        );
        self.integration_time = integration_time;
        Ok(())
    }

    fn enable_nuc(&mut self, enable: bool) -> CameraResult<()> {
        info!("Sim: NUC set to {}.", enable);
        self.nuc = enable;
        Ok(())
    }

    fn enable_bpr(&mut self, enable: bool) -> CameraResult<()> {
        info!("Sim: BPR set to {}.", enable);
        self.bpr = enable;
        Ok(())
    }

    fn enable_aec(&mut self, enable: bool) -> CameraResult<()> {
        info!("Sim: AEC set to {}.", enable);
        self.aec.enabled = enable;
        Ok(())
    }

    fn enable_agc(&mut self, enable: bool) -> CameraResult<()> {
        info!("Sim: AGC set to {}.", enable);
        self.agc.enabled = enable;
        Ok(())
    }

    fn configure_aec(&mut self, config: &AecConfig) -> CameraResult<()> {
        info!(
            "Sim: Configure AEC - lower={:?}, upper={:?}, frames={:?}.",
            config.lower_limit, config.upper_limit, config.num_frames_to_average
        );
        self.aec.lower_limit = config.lower_limit.or(self.aec.lower_limit);
        self.aec.upper_limit = config.upper_limit.or(self.aec.upper_limit);
        self.aec.num_frames_to_average = config
            .num_frames_to_average
            .or(self.aec.num_frames_to_average);
        Ok(())
    }

    fn configure_agc(&mut self, config: &AgcConfig) -> CameraResult<()> {
        info!(
            "Sim: Configure AGC - min={:?}, max={:?}.",
            config.min_target_value, config.max_target_value
        );
        self.agc.min_target_value = config.min_target_value.or(self.agc.min_target_value);
        self.agc.max_target_value = config.max_target_value.or(self.agc.max_target_value);
        Ok(())
    }

    fn set_column_sorting(&mut self, enable: bool) -> CameraResult<()> {
        info!("Sim: Column Sorting set to {}.", enable);
        self.column_sorting = enable;
        Ok(())
    }

    fn set_row_mirroring(&mut self, enable: bool) -> CameraResult<()> {
        info!("Sim: Row Mirroring set to {}.", enable);
        self.row_mirroring = enable;
        Ok(())
    }

    fn read_fpga_register(&mut self, address: u32) -> CameraResult<u32> {
        let value = match self.fpga_registers.get(&address) {
            Some(&v) => v,
            None => self.rng.random_range(0..256),
        };
        info!("Sim: read FPGA reg {:#x}, ret {:#x}.", address, value);
        Ok(value)
    }

    fn write_fpga_registers(&mut self, addresses: &[u32], values: &[u32]) -> CameraResult<()> {
        if addresses.len() != values.len() {
            return Err(CameraError::InvalidParameter(format!(
                "{} addresses but {} values",
                addresses.len(),
                values.len()
            )));
        }
        info!(
            "Sim: write FPGA regs {:x?} with {:x?}.",
            addresses, values
        );
        self.fpga_registers
            .extend(addresses.iter().copied().zip(values.iter().copied()));
        Ok(())
    }

    fn read_device(&mut self, address: u32) -> CameraResult<u32> {
        let value = match self.device_registers.get(&address) {
            Some(&v) => v,
            None => self.rng.random_range(0..256),
        };
        info!("Sim: read device reg {:#x}, ret {:#x}.", address, value);
        Ok(value)
    }

    fn write_device(&mut self, address: u32, data: u32) -> CameraResult<()> {
        info!("Sim: write device reg {:#x} with {:#x}.", address, data);
        self.device_registers.insert(address, data);
        Ok(())
    }

    fn read_flash(&mut self, start_address: u32, number_of_words: usize) -> CameraResult<Vec<u32>> {
        info!(
            "Sim: read flash at {:#x}, {} words.",
            start_address, number_of_words
        );
        let count = u32::try_from(number_of_words).map_err(|_| {
            CameraError::InvalidParameter(format!(
                "flash read of {number_of_words} words exceeds the address space"
            ))
        })?;
        let words = (0..count)
            .map(|i| {
                let address = start_address.wrapping_add(i);
                match self.flash.get(&address) {
                    Some(&w) => w,
                    None => self.rng.random_range(0..u32::MAX),
                }
            })
            .collect();
        Ok(words)
    }

    fn write_calibration(
        &mut self,
        memory_slot: u32,
        coefficients: &CalibrationCoefficients,
    ) -> CameraResult<()> {
        let base = memory_slot
            .checked_mul(FLASH_SLOT_WORDS)
            .ok_or_else(|| CameraError::InvalidParameter(format!("memory slot {memory_slot}")))?;
        let words = coefficients
            .gain
            .iter()
            .chain(coefficients.offset.iter())
            .map(|v| v.to_bits());
        if coefficients.gain.len() * 2 > FLASH_SLOT_WORDS as usize {
            return Err(CameraError::InvalidParameter(
                "calibration table does not fit in one flash slot".to_string(),
            ));
        }
        let mut written = 0u32;
        for (offset, word) in words.enumerate() {
            self.flash.insert(base + offset as u32, word);
            written += 1;
        }
        info!(
            "Sim: wrote {} calibration words to slot {} at {:#x}.",
            written, memory_slot, base
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fast_config() -> SimulatedConfig {
        SimulatedConfig {
            rows: 48,
            cols: 64,
            emulate_timing: false,
            seed: Some(7),
            ..SimulatedConfig::default()
        }
    }

    #[test]
    fn test_default_frame_shape_and_range() {
        let mut sensor = SimulatedSensor::new(SimulatedConfig {
            emulate_timing: false,
            ..SimulatedConfig::default()
        });
        sensor.perform_power_up().unwrap();
        let frames = sensor.get_frames(1).unwrap();
        let image = frames[0].image();
        assert_eq!(image.dim(), (480, 640));
        assert!(image.iter().all(|&v| (4000..14000).contains(&v)));
    }

    #[test]
    fn test_gradient_corners() {
        let gradient = diagonal_gradient(480, 640);
        assert_eq!(gradient[[0, 0]], 0);
        assert_eq!(gradient[[479, 639]], 2000);
    }

    #[test]
    fn test_lifecycle() {
        let mut sensor = SimulatedSensor::new(fast_config());
        assert_eq!(sensor.start().unwrap_err(), CameraError::NotPowered);
        assert_eq!(sensor.get_frames(1).unwrap_err(), CameraError::NotPowered);

        sensor.perform_power_up().unwrap();
        sensor.start().unwrap();
        assert!(sensor.is_running());

        sensor.perform_power_down().unwrap();
        assert!(!sensor.is_running());
        assert_eq!(sensor.is_powered(), Some(false));
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut sensor = SimulatedSensor::new(fast_config());
        sensor.perform_power_up().unwrap();
        let frames = sensor.get_frames(3).unwrap();
        let seqs: Vec<u64> = frames.iter().map(|f| f.sequence()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_timing_emulation_paces_frames() {
        let mut sensor = SimulatedSensor::new(SimulatedConfig {
            rows: 4,
            cols: 4,
            frame_rate: 100.0,
            ..SimulatedConfig::default()
        });
        sensor.perform_power_up().unwrap();
        let start = Instant::now();
        sensor.get_frames(4).unwrap();
        // First frame is immediate, the rest wait one period each
        assert!(start.elapsed() >= Duration::from_millis(29));
    }

    #[test]
    fn test_integration_time_units() {
        let mut sensor = SimulatedSensor::new(fast_config());
        assert_relative_eq!(sensor.integration_time_ms().unwrap(), 5.0);
        sensor.set_integration_time(100_000).unwrap();
        assert_relative_eq!(sensor.integration_time_ms().unwrap(), 1.0);
    }

    #[test]
    fn test_feature_toggles_reported() {
        let mut sensor = SimulatedSensor::new(fast_config());
        sensor.enable_nuc(true).unwrap();
        sensor.enable_aec(true).unwrap();
        sensor
            .configure_aec(&AecConfig {
                lower_limit: Some(0.2),
                ..AecConfig::default()
            })
            .unwrap();
        sensor.set_column_sorting(true).unwrap();

        assert!(sensor.nuc_enabled().unwrap());
        assert!(!sensor.bpr_enabled().unwrap());
        let aec = sensor.aec_state().unwrap();
        assert!(aec.enabled);
        assert_eq!(aec.lower_limit, Some(0.2));
        assert_eq!(aec.upper_limit, None);
        assert!(sensor.column_sorting());
    }

    #[test]
    fn test_register_write_then_read() {
        let mut sensor = SimulatedSensor::new(fast_config());
        sensor.write_fpga_registers(&[0x10, 0x14], &[0xAB, 0xCD]).unwrap();
        assert_eq!(sensor.read_fpga_register(0x14).unwrap(), 0xCD);
        assert!(sensor.read_fpga_register(0x99).unwrap() < 256);

        assert!(sensor.write_fpga_registers(&[0x10], &[]).is_err());

        sensor.write_device(0x3, 0x42).unwrap();
        assert_eq!(sensor.read_device(0x3).unwrap(), 0x42);
    }

    #[test]
    fn test_dac_validation() {
        let mut sensor = SimulatedSensor::new(fast_config());
        sensor.set_dac_voltage(2, 1.25).unwrap();
        assert_eq!(sensor.dac_voltage(2), Some(1.25));
        assert!(sensor.set_dac_voltage(2, 7.0).is_err());
        assert!(sensor.set_dac_voltage(DAC_CHANNELS, 1.0).is_err());
    }

    #[test]
    fn test_calibration_lands_in_flash() {
        let mut sensor = SimulatedSensor::new(fast_config());
        let coefficients = CalibrationCoefficients {
            gain: Array2::from_elem((1, 2), 1.5f32),
            offset: Array2::from_elem((1, 2), 100.0f32),
            temperature_c: None,
            integration_time_ms: None,
            dead_pixels: 0,
        };
        sensor.write_calibration(1, &coefficients).unwrap();

        let words = sensor.read_flash(FLASH_SLOT_WORDS, 4).unwrap();
        assert_eq!(f32::from_bits(words[0]), 1.5);
        assert_eq!(f32::from_bits(words[3]), 100.0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_flash_read_count_beyond_address_space() {
        let mut sensor = SimulatedSensor::new(fast_config());
        let err = sensor.read_flash(0, (1usize << 32) + 2).unwrap_err();
        assert!(matches!(err, CameraError::InvalidParameter(_)));
    }
}

//! Command line and runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use hardware::SensorKind;
use shared::image_proc::DEFAULT_JPEG_QUALITY;

/// Server options shared by every camera server binary.
#[derive(Args, Debug, Clone)]
pub struct CommonServerArgs {
    /// Interface to bind the websocket and metrics listener to
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Websocket command port (`/ws` and `/metrics`)
    #[arg(long, default_value_t = 8765)]
    pub port: u16,

    /// Port for the static UI server
    #[arg(long, default_value_t = 5173)]
    pub http_port: u16,

    /// Directory holding the built UI
    #[arg(long, default_value = "dist")]
    pub static_dir: PathBuf,

    /// JPEG quality for streamed frames (1-100)
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Frames held between acquisition and delivery before the oldest is dropped
    #[arg(long, default_value_t = 4, value_parser = parse_capacity)]
    pub buffer_capacity: usize,

    /// Sensor backend opened for each client session
    #[arg(long, value_enum, default_value_t = SensorKind::Simulated)]
    pub sensor: SensorKind,
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("buffer capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl CommonServerArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            jpeg_quality: self.jpeg_quality,
            buffer_capacity: self.buffer_capacity,
            tuning: StreamTuning::default(),
        }
    }
}

/// Timing constants for acquisition, delivery and command pacing.
#[derive(Debug, Clone)]
pub struct StreamTuning {
    /// Consecutive capture failures before a stop/start cycle
    pub failure_threshold: u32,
    /// Sleep after each failed capture
    pub failure_backoff: Duration,
    /// Pause between stop and start during a restart cycle
    pub restart_pause: Duration,
    /// Sleep while the sensor reports it is not running
    pub idle_poll: Duration,
    /// How long the consumer waits on the buffer before re-checking the stop signal
    pub consumer_wait: Duration,
    /// Bound on waiting for the producer thread to exit
    pub join_timeout: Duration,
    /// Pacing rate when the sensor cannot report one
    pub fallback_frame_rate: f64,
    /// Delay between frames sent by `get_frames`
    pub get_frames_delay: Duration,
    /// Largest `num_frames` a single `get_frames` may ask for
    pub max_frames_per_request: usize,
    /// Delay between simulated calibration steps
    pub calibration_step_delay: Duration,
}

impl Default for StreamTuning {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_backoff: Duration::from_millis(50),
            restart_pause: Duration::from_millis(500),
            idle_poll: Duration::from_millis(20),
            consumer_wait: Duration::from_millis(50),
            join_timeout: Duration::from_secs(2),
            fallback_frame_rate: 30.0,
            get_frames_delay: Duration::from_millis(100),
            max_frames_per_request: 100,
            calibration_step_delay: Duration::from_millis(500),
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jpeg_quality: u8,
    pub buffer_capacity: usize,
    pub tuning: StreamTuning,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            buffer_capacity: 4,
            tuning: StreamTuning::default(),
        }
    }
}

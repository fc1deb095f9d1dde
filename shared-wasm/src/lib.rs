//! Wire types shared between the camera server and the browser UI.
//!
//! Everything in here must stay WASM-compatible: no threads, no filesystem,
//! no native-only dependencies.

pub mod messages;
pub mod stats_scan;
mod types;

pub use messages::{CommandRequest, ServerMessage};
pub use stats_scan::{StatsError, StatsScan};
pub use types::{AecState, AgcState, CameraInfo, CameraStatus, FrameSource, FrameStats};

/// Number of histogram buckets attached to every image frame.
pub const HISTOGRAM_BUCKETS: usize = 128;

/// Upper bound (exclusive) of the histogram domain. Sensor samples are 14-bit.
pub const HISTOGRAM_DOMAIN: u32 = 16384;

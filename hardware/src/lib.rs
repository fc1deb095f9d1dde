//! Sensor backends for the SWIR camera server.
//!
//! Every backend implements [`shared::camera_interface::SensorInterface`].
//! [`open_sensor`] creates one handle per client session.

pub mod sim;

use clap::ValueEnum;
use shared::camera_interface::SensorInterface;
use thiserror::Error;
use tracing::info;

pub use sim::{SimulatedConfig, SimulatedSensor};

/// Which backend to open for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SensorKind {
    /// In-process noise+gradient generator
    #[default]
    Simulated,
    /// Vendor driver for the physical sensor
    Live,
}

/// Failure to create a sensor handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareInitError {
    #[error("{0} sensor driver is not available in this build")]
    Unavailable(&'static str),
    #[error("Sensor initialization failed: {0}")]
    Failed(String),
}

/// Open a fresh sensor handle of the given kind.
pub fn open_sensor(kind: SensorKind) -> Result<Box<dyn SensorInterface>, HardwareInitError> {
    match kind {
        SensorKind::Simulated => {
            let sensor = SimulatedSensor::new(SimulatedConfig::default());
            info!("Opened {} sensor", sensor.name());
            Ok(Box::new(sensor))
        }
        SensorKind::Live => Err(HardwareInitError::Unavailable("live")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_wasm::FrameSource;

    #[test]
    fn test_open_simulated() {
        let sensor = open_sensor(SensorKind::Simulated).unwrap();
        assert_eq!(sensor.source(), FrameSource::Simulated);
        assert!(!sensor.is_running());
        assert_eq!(sensor.is_powered(), Some(false));
    }

    #[test]
    fn test_open_live_unavailable() {
        let err = open_sensor(SensorKind::Live).err().unwrap();
        assert_eq!(err, HardwareInitError::Unavailable("live"));
        assert!(err.to_string().contains("live"));
    }
}

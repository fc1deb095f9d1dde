//! Sensor-facing building blocks for the SWIR camera server.
//!
//! - [`camera_interface`]: the hardware trait, frames, errors and the shared frame buffer
//! - [`image_proc`]: raw frame to JPEG + histogram + statistics
//! - [`calibration`]: dark/bright image sets and non-uniformity coefficients

pub mod calibration;
pub mod camera_interface;
pub mod image_proc;

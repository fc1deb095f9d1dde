//! Websocket control and streaming server for a SWIR image sensor.
//!
//! One [`session::Session`] per client connection owns the sensor handle and
//! the power/stream state machine. While streaming, a producer thread feeds a
//! drop-oldest frame buffer and a delivery task paces encoded frames out to
//! the client (see [`stream`]).

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod info;
pub mod metrics;
pub mod outbox;
pub mod passthrough;
pub mod server;
pub mod session;
pub mod stream;

pub use config::{CommonServerArgs, SessionConfig, StreamTuning};
pub use error::{CommandError, CommandResult, HardwareInitError};
pub use session::Session;

//! Command and connection errors.

use shared::calibration::CalibrationError;
use shared::camera_interface::CameraError;
use shared::image_proc::EncodingError;
use thiserror::Error;

pub use hardware::HardwareInitError;

/// Failure of a single client command.
///
/// Everything except [`CommandError::TransportClosed`] is reported to the
/// client as an `error` message and the connection continues.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not legal in the current session state
    #[error("{0}")]
    StateViolation(String),

    #[error("Unknown command '{command}'. Available commands: {}", available.join(", "))]
    UnknownCommand {
        command: String,
        available: Vec<String>,
    },

    #[error("Invalid parameters for '{command}': {reason}")]
    InvalidParams { command: String, reason: String },

    #[error(transparent)]
    Hardware(#[from] CameraError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("Transport closed")]
    TransportClosed,
}

impl CommandError {
    pub fn state(message: impl Into<String>) -> Self {
        CommandError::StateViolation(message.into())
    }

    pub fn invalid_params(command: &str, reason: impl ToString) -> Self {
        CommandError::InvalidParams {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_transport_closed(&self) -> bool {
        matches!(self, CommandError::TransportClosed)
    }

    /// Text sent to the client in an `error` message.
    pub fn client_message(&self) -> String {
        match self {
            CommandError::StateViolation(_)
            | CommandError::UnknownCommand { .. }
            | CommandError::InvalidParams { .. } => self.to_string(),
            CommandError::Calibration(e) => format!("Calibration failed: {e}"),
            _ => format!("An error occurred: {self}"),
        }
    }
}

pub type CommandResult<T = ()> = Result<T, CommandError>;

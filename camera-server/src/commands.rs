//! Command parsing and dispatch.

use serde::Deserialize;
use serde_json::Value;
use shared_wasm::CommandRequest;
use tracing::{info, warn};

use crate::error::{CommandError, CommandResult};
use crate::passthrough::parse_params;
use crate::session::calibration::ImageRows;
use crate::session::Session;

/// Commands with a dedicated handler.
pub const BUILTIN_COMMANDS: &[&str] = &[
    "power_on",
    "power_off",
    "start_stream",
    "stop_stream",
    "get_status",
    "get_frames",
    "set_dac_voltage",
    "run_calibration_script",
    "upload_calibration_images",
    "generate_calibration_coefficients",
    "write_calibration_to_flash",
];

fn one() -> usize {
    1
}

#[derive(Deserialize)]
struct GetFrames {
    #[serde(default = "one")]
    num_frames: usize,
}

#[derive(Deserialize)]
struct SetDacVoltage {
    channel: u8,
    voltage: f64,
}

#[derive(Deserialize)]
struct UploadCalibration {
    dark_images: Vec<ImageRows>,
    bright_images: Vec<ImageRows>,
    temperature: Option<f64>,
    integration_time_ms: Option<f64>,
}

#[derive(Deserialize)]
struct GenerateCalibration {
    temperature: Option<f64>,
    integration_time_ms: Option<f64>,
}

#[derive(Deserialize)]
struct WriteCalibration {
    #[serde(default)]
    memory_slot: u32,
}

/// Every command name the session accepts, sorted.
pub fn available_commands(session: &Session) -> Vec<String> {
    let mut names: Vec<String> = BUILTIN_COMMANDS
        .iter()
        .copied()
        .chain(session.passthrough().names())
        .map(str::to_string)
        .collect();
    names.sort_unstable();
    names
}

/// Route one request to its handler.
pub async fn dispatch(session: &mut Session, request: CommandRequest) -> CommandResult {
    let CommandRequest { command, params } = request;
    let shown = Value::Object(params.clone());
    info!("Received command: {} with params: {}", command, shown);

    match command.as_str() {
        "power_on" => session.power_on().await,
        "power_off" => session.power_off().await,
        "start_stream" => session.start_stream().await,
        "stop_stream" => session.stop_stream().await,
        "get_status" => session.get_status().await,
        "get_frames" => {
            let p: GetFrames = parse_params(&command, &params)?;
            session.get_frames(p.num_frames).await
        }
        "set_dac_voltage" => {
            let p: SetDacVoltage = parse_params(&command, &params)?;
            session.set_dac_voltage(p.channel, p.voltage).await
        }
        "run_calibration_script" => session.run_calibration_script().await,
        "upload_calibration_images" => {
            let p: UploadCalibration = parse_params(&command, &params)?;
            session
                .upload_calibration_images(
                    p.dark_images,
                    p.bright_images,
                    p.temperature,
                    p.integration_time_ms,
                )
                .await
        }
        "generate_calibration_coefficients" => {
            let p: GenerateCalibration = parse_params(&command, &params)?;
            session
                .generate_calibration_coefficients(p.temperature, p.integration_time_ms)
                .await
        }
        "write_calibration_to_flash" => {
            let p: WriteCalibration = parse_params(&command, &params)?;
            session.write_calibration_to_flash(p.memory_slot).await
        }
        other if session.passthrough().contains(other) => {
            session.run_passthrough(other, params).await
        }
        other => Err(CommandError::UnknownCommand {
            command: other.to_string(),
            available: available_commands(session),
        }),
    }
}

/// Run one command, reporting failures to the client.
///
/// Only returns an error when the transport has closed.
pub async fn handle_command(session: &mut Session, request: CommandRequest) -> CommandResult {
    match dispatch(session, request).await {
        Err(CommandError::TransportClosed) => Err(CommandError::TransportClosed),
        Err(e) => {
            warn!("Command failed: {}", e);
            session.outbox().error(e.client_message()).await
        }
        Ok(()) => Ok(()),
    }
}

/// Parse one inbound text frame and run it.
pub async fn handle_text(session: &mut Session, text: &str) -> CommandResult {
    match serde_json::from_str::<CommandRequest>(text) {
        Ok(request) => handle_command(session, request).await,
        Err(e) => {
            warn!("Failed to parse command: {}", e);
            session
                .outbox()
                .error(format!("An error occurred: {e}"))
                .await
        }
    }
}

//! Calibration commands.

use shared::calibration::image_from_rows;
use shared_wasm::FrameSource;
use tracing::warn;

use super::Session;
use crate::error::CommandResult;

/// Progress messages for the simulated calibration run
const SIMULATED_STEPS: [&str; 4] = [
    "Simulating calibration: Erasing flash sectors...",
    "Simulating calibration: Writing default metadata...",
    "Simulating calibration: Verifying written data...",
    "Calibration simulation complete. All values verified.",
];

/// One uploaded image as nested rows of samples.
pub type ImageRows = Vec<Vec<u16>>;

impl Session {
    pub async fn run_calibration_script(&mut self) -> CommandResult {
        let outbox = &self.ctx.outbox;
        outbox.log("Starting calibration script execution...").await?;

        if self.ctx.source == FrameSource::Simulated {
            let delay = self.ctx.config.tuning.calibration_step_delay;
            for (i, step) in SIMULATED_STEPS.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(delay).await;
                }
                outbox.log(*step).await?;
            }
            return Ok(());
        }

        let sensor = self.ctx.sensor.clone();
        let result = tokio::task::spawn_blocking(move || sensor.blocking_lock().run_calibration_script())
            .await;
        match result {
            Ok(Ok(steps)) => {
                for step in steps {
                    outbox.log(step).await?;
                }
                outbox.log("Calibration script completed.").await
            }
            Ok(Err(e)) => outbox.error(format!("Calibration failed: {e}")).await,
            Err(e) => {
                warn!("Calibration task failed: {}", e);
                outbox.error(format!("Calibration failed: {e}")).await
            }
        }
    }

    pub async fn upload_calibration_images(
        &mut self,
        dark_images: Vec<ImageRows>,
        bright_images: Vec<ImageRows>,
        temperature_c: Option<f64>,
        integration_time_ms: Option<f64>,
    ) -> CommandResult {
        let convert = |images: &[ImageRows]| {
            images
                .iter()
                .map(|rows| image_from_rows(rows))
                .collect::<Result<Vec<_>, _>>()
        };
        let dark = convert(&dark_images);
        let bright = convert(&bright_images);

        // Any upload replaces the previous dataset, valid or not
        let (dark, bright) = match (dark, bright) {
            (Ok(dark), Ok(bright)) => (dark, bright),
            (Err(e), _) | (_, Err(e)) => {
                self.calibration = Default::default();
                return Err(e.into());
            }
        };
        self.calibration
            .upload(dark, bright, temperature_c, integration_time_ms)?;

        self.ctx
            .outbox
            .log(format!(
                "Uploaded {} dark and {} bright calibration images.",
                self.calibration.dark_count(),
                self.calibration.bright_count()
            ))
            .await
    }

    pub async fn generate_calibration_coefficients(
        &mut self,
        temperature_c: Option<f64>,
        integration_time_ms: Option<f64>,
    ) -> CommandResult {
        let coefficients = self
            .calibration
            .generate(temperature_c, integration_time_ms)?;
        let (rows, cols) = coefficients.dimensions();
        let message = format!(
            "Generated calibration coefficients for {rows}x{cols} pixels ({} dead).",
            coefficients.dead_pixels
        );
        self.ctx.outbox.log(message).await
    }

    pub async fn write_calibration_to_flash(&mut self, memory_slot: u32) -> CommandResult {
        let coefficients = self.calibration.coefficients()?;
        self.ctx
            .sensor
            .lock()
            .await
            .write_calibration(memory_slot, coefficients)?;
        self.ctx
            .outbox
            .log(format!("Calibration written to flash slot {memory_slot}."))
            .await
    }
}

//! Two-point non-uniformity calibration.
//!
//! A [`CalibrationDataset`] collects stacks of dark and bright frames taken at
//! one temperature and integration time. Generating coefficients averages each
//! stack per pixel and derives a gain that flattens the pixel response:
//!
//! ```text
//! response[p] = bright_mean[p] - dark_mean[p]
//! gain[p]     = mean(response) / response[p]
//! offset[p]   = dark_mean[p]
//! corrected   = gain * (raw - offset)
//! ```
//!
//! Pixels with no positive response are flagged dead and get unit gain.

use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("No {0} images uploaded")]
    EmptySet(&'static str),
    #[error("Image rows have inconsistent lengths")]
    RaggedImage,
    #[error("Image {index} of {set} set is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        set: &'static str,
        index: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("Calibration coefficients have not been generated")]
    NotGenerated,
    #[error("No pixel has a positive bright-dark response")]
    DegenerateResponse,
}

/// Per-pixel gain/offset table ready to be written to flash.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCoefficients {
    pub gain: Array2<f32>,
    pub offset: Array2<f32>,
    pub temperature_c: Option<f64>,
    pub integration_time_ms: Option<f64>,
    pub dead_pixels: usize,
}

impl CalibrationCoefficients {
    /// (rows, cols)
    pub fn dimensions(&self) -> (usize, usize) {
        self.gain.dim()
    }

    /// Apply the correction to one raw frame.
    pub fn apply(&self, raw: &Array2<u16>) -> Array2<f32> {
        let mut out = raw.mapv(|v| v as f32);
        out -= &self.offset;
        out *= &self.gain;
        out
    }
}

/// Build an image from row-major nested rows.
pub fn image_from_rows(rows: &[Vec<u16>]) -> Result<Array2<u16>, CalibrationError> {
    let cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != cols) {
        return Err(CalibrationError::RaggedImage);
    }
    let flat: Vec<u16> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), cols), flat).map_err(|_| CalibrationError::RaggedImage)
}

/// Uploaded calibration frames plus generated coefficients.
#[derive(Debug, Clone, Default)]
pub struct CalibrationDataset {
    dark_images: Vec<Array2<u16>>,
    bright_images: Vec<Array2<u16>>,
    temperature_c: Option<f64>,
    integration_time_ms: Option<f64>,
    coefficients: Option<CalibrationCoefficients>,
}

impl CalibrationDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dataset with a new upload.
    ///
    /// Always resets previous state, including generated coefficients, even
    /// when validation fails.
    pub fn upload(
        &mut self,
        dark_images: Vec<Array2<u16>>,
        bright_images: Vec<Array2<u16>>,
        temperature_c: Option<f64>,
        integration_time_ms: Option<f64>,
    ) -> Result<(), CalibrationError> {
        *self = Self::default();

        if dark_images.is_empty() {
            return Err(CalibrationError::EmptySet("dark"));
        }
        if bright_images.is_empty() {
            return Err(CalibrationError::EmptySet("bright"));
        }

        let expected = dark_images[0].dim();
        for (set, images) in [("dark", &dark_images), ("bright", &bright_images)] {
            if let Some((index, img)) = images.iter().enumerate().find(|(_, i)| i.dim() != expected)
            {
                return Err(CalibrationError::ShapeMismatch {
                    set,
                    index,
                    expected,
                    actual: img.dim(),
                });
            }
        }
        if expected.0 == 0 || expected.1 == 0 {
            return Err(CalibrationError::EmptySet("pixel"));
        }

        self.dark_images = dark_images;
        self.bright_images = bright_images;
        self.temperature_c = temperature_c;
        self.integration_time_ms = integration_time_ms;
        Ok(())
    }

    pub fn dark_count(&self) -> usize {
        self.dark_images.len()
    }

    pub fn bright_count(&self) -> usize {
        self.bright_images.len()
    }

    pub fn is_generated(&self) -> bool {
        self.coefficients.is_some()
    }

    pub fn coefficients(&self) -> Result<&CalibrationCoefficients, CalibrationError> {
        self.coefficients
            .as_ref()
            .ok_or(CalibrationError::NotGenerated)
    }

    /// Compute two-point coefficients from the uploaded sets.
    ///
    /// Explicit temperature and integration time override the values given at
    /// upload.
    pub fn generate(
        &mut self,
        temperature_c: Option<f64>,
        integration_time_ms: Option<f64>,
    ) -> Result<&CalibrationCoefficients, CalibrationError> {
        let dark = stack_mean(&self.dark_images).ok_or(CalibrationError::EmptySet("dark"))?;
        let bright = stack_mean(&self.bright_images).ok_or(CalibrationError::EmptySet("bright"))?;

        let response = &bright - &dark;
        let live: Vec<f32> = response.iter().copied().filter(|&r| r > 0.0).collect();
        if live.is_empty() {
            return Err(CalibrationError::DegenerateResponse);
        }
        let mean_response = live.iter().sum::<f32>() / live.len() as f32;
        let dead_pixels = response.len() - live.len();
        let gain = response.mapv(|r| if r > 0.0 { mean_response / r } else { 1.0 });

        let coefficients = CalibrationCoefficients {
            gain,
            offset: dark,
            temperature_c: temperature_c.or(self.temperature_c),
            integration_time_ms: integration_time_ms.or(self.integration_time_ms),
            dead_pixels,
        };
        Ok(self.coefficients.insert(coefficients))
    }
}

fn stack_mean(images: &[Array2<u16>]) -> Option<Array2<f32>> {
    let first = images.first()?;
    let mut sum = Array2::<f32>::zeros(first.dim());
    for img in images {
        sum += &img.mapv(|v| v as f32);
    }
    Some(sum / images.len() as f32)
}

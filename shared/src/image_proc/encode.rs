//! Raw frame to transport-ready JPEG, histogram and statistics.
//!
//! The pipeline is a pure function of the sample grid:
//!
//! 1. min / max / mean over all samples
//! 2. 128-bucket histogram over the fixed domain `[0, 16384)`
//! 3. linear stretch of `[min, max]` onto `[0, 255]`
//! 4. grayscale JPEG encode at a configurable quality
//!
//! The histogram domain does not follow the observed range, so histograms of
//! different frames can be compared bucket by bucket. Samples at or above the
//! domain end (possible with 16-bit drivers) are counted in the last bucket.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageBuffer};
use ndarray::{Array2, ArrayView2};
use shared_wasm::{FrameStats, StatsScan, HISTOGRAM_BUCKETS, HISTOGRAM_DOMAIN};
use thiserror::Error;

use crate::camera_interface::RawFrame;

/// JPEG quality used when none is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

const BUCKET_WIDTH: u32 = HISTOGRAM_DOMAIN / HISTOGRAM_BUCKETS as u32;

/// Errors from the frame encoding pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Frame has no samples ({rows}x{cols})")]
    EmptyFrame { rows: usize, cols: usize },
    #[error("Frame dimensions {rows}x{cols} exceed encoder limits")]
    TooLarge { rows: usize, cols: usize },
    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
}

/// Output of the encoding pipeline for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub jpeg: Bytes,
    pub histogram: Vec<u32>,
    pub stats: FrameStats,
    pub width: u32,
    pub height: u32,
}

/// Compute min, max and mean over every sample.
pub fn compute_stats(image: ArrayView2<u16>) -> Result<FrameStats, EncodingError> {
    let (rows, cols) = image.dim();
    let (min, max, mean) = StatsScan::new(image.iter().copied())
        .min_max_mean()
        .map_err(|_| EncodingError::EmptyFrame { rows, cols })?;
    Ok(FrameStats { min, max, mean })
}

/// 128-bucket histogram over `[0, 16384)`.
///
/// Bucket counts always sum to the number of samples.
pub fn compute_histogram(image: ArrayView2<u16>) -> Vec<u32> {
    let mut histogram = vec![0u32; HISTOGRAM_BUCKETS];
    for &value in image.iter() {
        let bucket = ((value as u32) / BUCKET_WIDTH).min(HISTOGRAM_BUCKETS as u32 - 1);
        histogram[bucket as usize] += 1;
    }
    histogram
}

/// Stretch `[stats.min, stats.max]` linearly onto `[0, 255]`.
///
/// A flat frame (max == min) maps to all zeros.
pub fn normalize_to_u8(image: ArrayView2<u16>, stats: &FrameStats) -> Array2<u8> {
    let min = stats.min as u32;
    let range = (stats.max as u32).saturating_sub(min).max(1);
    image.mapv(|v| ((v as u32).saturating_sub(min) * 255 / range).min(255) as u8)
}

/// Encode row-major 8-bit grayscale data as JPEG.
pub fn encode_gray_jpeg(
    data: Vec<u8>,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Bytes, EncodingError> {
    let img: GrayImage = ImageBuffer::from_raw(width, height, data).ok_or_else(|| {
        EncodingError::Jpeg(format!("buffer does not match {width}x{height} image"))
    })?;

    let mut jpeg_bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, quality);
    encoder
        .encode_image(&img)
        .map_err(|e| EncodingError::Jpeg(e.to_string()))?;

    Ok(Bytes::from(jpeg_bytes))
}

/// Runs the full pipeline with a fixed JPEG quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    /// Quality is clamped to the JPEG range 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one frame. Never mutates the input.
    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame, EncodingError> {
        self.encode_image(frame.image().view())
    }

    pub fn encode_image(&self, image: ArrayView2<u16>) -> Result<EncodedFrame, EncodingError> {
        let (rows, cols) = image.dim();
        if rows == 0 || cols == 0 {
            return Err(EncodingError::EmptyFrame { rows, cols });
        }
        let (Ok(height), Ok(width)) = (u32::try_from(rows), u32::try_from(cols)) else {
            return Err(EncodingError::TooLarge { rows, cols });
        };

        let stats = compute_stats(image)?;
        let histogram = compute_histogram(image);
        let normalized = normalize_to_u8(image, &stats);

        // mapv yields a standard-layout array, so this is row-major
        let (data, _offset) = normalized.into_raw_vec_and_offset();
        let jpeg = encode_gray_jpeg(data, width, height, self.quality)?;

        Ok(EncodedFrame {
            jpeg,
            histogram,
            stats,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_stats() {
        let image = Array2::from_shape_vec((2, 2), vec![10u16, 20, 30, 40]).unwrap();
        let stats = compute_stats(image.view()).unwrap();
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 40);
        assert_relative_eq!(stats.mean, 25.0);
    }

    #[test]
    fn test_flat_frame_normalizes_to_zero() {
        let image = Array2::from_elem((8, 8), 5000u16);
        let stats = compute_stats(image.view()).unwrap();
        let normalized = normalize_to_u8(image.view(), &stats);
        assert!(normalized.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_flat_frame_single_histogram_bucket() {
        let image = Array2::from_elem((8, 8), 5000u16);
        let histogram = compute_histogram(image.view());
        assert_eq!(histogram.len(), HISTOGRAM_BUCKETS);

        let nonzero: Vec<usize> = histogram
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(nonzero, vec![5000 / 128]);
        assert_eq!(histogram[5000 / 128], 64);
    }

    #[test]
    fn test_histogram_sums_to_sample_count() {
        let image = Array2::from_shape_fn((37, 53), |(r, c)| ((r * 977 + c * 131) % 65536) as u16);
        let histogram = compute_histogram(image.view());
        let total: u64 = histogram.iter().map(|&c| c as u64).sum();
        assert_eq!(total, 37 * 53);
    }

    #[test]
    fn test_out_of_domain_samples_land_in_last_bucket() {
        let image = Array2::from_shape_vec((1, 3), vec![16383u16, 16384, 65535]).unwrap();
        let histogram = compute_histogram(image.view());
        assert_eq!(histogram[HISTOGRAM_BUCKETS - 1], 3);
    }

    #[test]
    fn test_normalize_endpoints() {
        let image = Array2::from_shape_vec((1, 3), vec![100u16, 150, 200]).unwrap();
        let stats = compute_stats(image.view()).unwrap();
        let normalized = normalize_to_u8(image.view(), &stats);
        assert_eq!(normalized[[0, 0]], 0);
        assert_eq!(normalized[[0, 1]], 127);
        assert_eq!(normalized[[0, 2]], 255);
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let image = Array2::from_shape_fn((16, 16), |(r, c)| (r * 16 + c) as u16 * 10);
        let frame = RawFrame::now(image.clone(), 0);
        let encoded = FrameEncoder::new(80).encode(&frame).unwrap();

        // JPEG magic bytes
        assert_eq!(&encoded.jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!((encoded.width, encoded.height), (16, 16));
        // Input untouched
        assert_eq!(frame.image(), &image);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let image = Array2::from_shape_fn((24, 32), |(r, c)| (r * 300 + c * 7) as u16);
        let encoder = FrameEncoder::default();
        let a = encoder.encode_image(image.view()).unwrap();
        let b = encoder.encode_image(image.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decoded_jpeg_maps_min_to_black_and_max_to_white() {
        // Two uniform 8x8 blocks per row keep JPEG blocks flat, so the
        // round trip is nearly exact.
        let image = Array2::from_shape_fn((16, 16), |(_, c)| if c < 8 { 120u16 } else { 9000 });
        let encoded = FrameEncoder::new(95).encode_image(image.view()).unwrap();

        let decoded = image::load_from_memory(&encoded.jpeg).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (16, 16));
        let dark = decoded.get_pixel(2, 2).0[0];
        let bright = decoded.get_pixel(13, 13).0[0];
        assert!(dark <= 4, "min sample decoded as {dark}");
        assert!(bright >= 251, "max sample decoded as {bright}");
        assert!(dark < bright);
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let image = Array2::<u16>::zeros((0, 4));
        let err = FrameEncoder::default().encode_image(image.view()).unwrap_err();
        assert_eq!(err, EncodingError::EmptyFrame { rows: 0, cols: 4 });
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(FrameEncoder::new(0).quality(), 1);
        assert_eq!(FrameEncoder::new(255).quality(), 100);
    }
}

//! Image processing for outgoing frames.

pub mod encode;

pub use encode::{
    compute_histogram, compute_stats, encode_gray_jpeg, normalize_to_u8, EncodedFrame,
    EncodingError, FrameEncoder, DEFAULT_JPEG_QUALITY,
};

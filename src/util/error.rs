//! Error types for moonreg.

use thiserror::Error;

/// Result alias for moonreg operations.
pub type MoonRegResult<T> = std::result::Result<T, MoonRegError>;

/// Errors that can occur when detecting, registering or compositing images.
///
/// "Not found" outcomes (an invalid [`crate::Circle`]) are values, not errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoonRegError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Channel count is not 1, 3 or 4.
    #[error("unsupported channel count: {channels}")]
    InvalidChannels { channels: usize },
    /// The backing buffer is shorter than the declared layout.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Row stride is shorter than a row.
    #[error("invalid stride {stride} for row of {width} bytes")]
    InvalidStride { width: usize, stride: usize },
    /// A region of interest does not fit inside its image.
    #[error(
        "roi ({x}, {y}, {width}x{height}) out of bounds for {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// The circle detector faulted on its input.
    #[error("detection failed: {reason}")]
    DetectionError { reason: String },
    /// Not enough features or matches, or a degenerate homography.
    #[error("registration failed: {reason}")]
    RegistrationError { reason: String },
    /// The selected algorithm needs a capability absent from this build.
    #[error("algorithm `{algorithm}` is not available in this build")]
    UnsupportedAlgorithm { algorithm: &'static str },
    /// A homography could not be applied (singular or non-finite).
    #[error("transform failed: {reason}")]
    TransformError { reason: String },
    /// Image decoding or encoding failed.
    #[error("image io: {reason}")]
    ImageIo { reason: String },
}

impl MoonRegError {
    pub(crate) fn detection(reason: impl Into<String>) -> Self {
        Self::DetectionError {
            reason: reason.into(),
        }
    }

    pub(crate) fn registration(reason: impl Into<String>) -> Self {
        Self::RegistrationError {
            reason: reason.into(),
        }
    }

    pub(crate) fn transform(reason: impl Into<String>) -> Self {
        Self::TransformError {
            reason: reason.into(),
        }
    }
}

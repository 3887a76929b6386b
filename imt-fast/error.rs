use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FastError {
    #[error("invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },
    #[error("image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },
    #[error("image {width}x{height} too small (minimum {min_size}x{min_size})")]
    ImageTooSmall { width: usize, height: usize, min_size: usize },
    #[error("invalid threshold: {0} (must be 1-127)")]
    InvalidThreshold(u8),
    #[error("invalid arc length: {0} (must be 9-16)")]
    InvalidArcLength(usize),
    #[error("invalid patch size: {0} (must be odd, 3 to {max})", max = imt_core::MAX_PATCH_SIZE)]
    InvalidPatchSize(usize),
    #[error("invalid non-maximum suppression radius: {0}")]
    InvalidNmsRadius(f32),
    #[error("invalid pyramid scale factor: {0} (must be finite and > 1)")]
    InvalidScaleFactor(f32),
    #[error("invalid pyramid level count: {0} (must be > 0)")]
    InvalidLevelCount(usize),
}

pub type FastResult<T> = Result<T, FastError>;

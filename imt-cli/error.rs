use imt_brief::BriefError;
use imt_fast::FastError;
use imt_index::IndexError;
use thiserror::Error;

use crate::progress::ProgressError;

/// Reader-side problems other than a version mismatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("bad magic bytes {0:?}")]
    BadMagic([u8; 4]),
    #[error("unexpected end of data at byte {offset}: needed {needed}, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("unsupported descriptor length {0}")]
    DescriptorLength(u32),
    #[error("invalid polarity code {0}")]
    InvalidPolarity(u8),
    #[error("invalid node tag {0}")]
    InvalidNodeTag(u8),
    #[error("{0} bytes after the last target")]
    TrailingBytes(usize),
    #[error("target {target}: {source}")]
    Index {
        target: usize,
        #[source]
        source: IndexError,
    },
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("image {index}: {reason}")]
    InvalidImage { index: usize, reason: String },
    #[error("image {index}: no keypoints on any pyramid level")]
    NoFeatures { index: usize },
    #[error("image {index}, level {level}: {source}")]
    DescriptorSampling {
        index: usize,
        level: usize,
        #[source]
        source: BriefError,
    },
    #[error("image {index}: index construction failed: {source}")]
    Index {
        index: usize,
        #[source]
        source: IndexError,
    },
    #[error("unsupported bundle version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("malformed bundle: {0}")]
    Format(#[from] FormatError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("progress observer stopped the batch: {0}")]
    Progress(#[from] ProgressError),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CompileError {
    /// Attach the batch position to a pyramid or detector failure
    pub(crate) fn from_fast(index: usize, err: FastError) -> Self {
        match err {
            FastError::InvalidImageSize { .. }
            | FastError::InvalidImageData { .. }
            | FastError::ImageTooSmall { .. } => CompileError::InvalidImage {
                index,
                reason: err.to_string(),
            },
            other => CompileError::Config(other.to_string()),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

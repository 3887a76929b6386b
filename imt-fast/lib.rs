//! Multi-scale FAST keypoint extraction.
//!
//! [`ImagePyramid`] produces the level schedule and the downsampled levels,
//! [`FastDetector`] turns one level into oriented, suppressed keypoints.

pub mod corner_detection;
pub mod detector;
pub mod error;
pub mod pyramid;
pub mod refinement;
pub mod types;
pub mod utils;

pub use corner_detection::CornerDetector;
pub use detector::FastDetector;
pub use error::{FastError, FastResult};
pub use pyramid::{ImagePyramid, PyramidLevels};
pub use refinement::KeypointRefinement;
pub use types::{PyramidLevel, ScaleLevel, ScoredKeypoint};

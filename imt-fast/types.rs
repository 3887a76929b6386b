use std::borrow::Cow;

use imt_core::{Keypoint, Polarity, RasterImage};

/// Keypoint with corner response score for NMS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredKeypoint {
    pub keypoint: Keypoint,
    pub response: f32,
    pub polarity: Polarity,
}

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    /// Input size divided by level size
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

/// One level of the pyramid; level 0 borrows the input buffer
#[derive(Debug, Clone)]
pub struct PyramidLevel<'a> {
    pub scale: ScaleLevel,
    pub data: Cow<'a, [u8]>,
}

impl PyramidLevel<'_> {
    pub fn view(&self) -> RasterImage<'_> {
        RasterImage::new(self.scale.width, self.scale.height, &self.data)
    }
}

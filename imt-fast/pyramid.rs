use std::borrow::Cow;

use imt_core::{binomial_blur, PyramidConfig, RasterImage};

use crate::error::{FastError, FastResult};
use crate::types::{PyramidLevel, ScaleLevel};

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate the level schedule for an image of the given size.
    ///
    /// Level `k` is `floor(size / scale_factor^k)` on each axis. The schedule
    /// stops at `max_levels` or before the first level smaller than
    /// `max(min_level_size, min_working_size)`.
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        cfg: &PyramidConfig,
        min_working_size: usize,
    ) -> FastResult<Vec<ScaleLevel>> {
        if width == 0 || height == 0 {
            return Err(FastError::InvalidImageSize { width, height });
        }
        Self::validate_config(cfg)?;

        let min_size = cfg.min_level_size.max(min_working_size).max(1);
        if width < min_size || height < min_size {
            return Err(FastError::ImageTooSmall {
                width,
                height,
                min_size,
            });
        }

        let mut levels = Vec::with_capacity(cfg.max_levels.min(32));
        for level in 0..cfg.max_levels {
            let scale = cfg.scale_factor.powi(level as i32);
            let scaled_width = ((width as f32) / scale) as usize;
            let scaled_height = ((height as f32) / scale) as usize;

            if scaled_width < min_size || scaled_height < min_size {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale,
                width: if level == 0 { width } else { scaled_width },
                height: if level == 0 { height } else { scaled_height },
            });
        }

        Ok(levels)
    }

    pub fn validate_config(cfg: &PyramidConfig) -> FastResult<()> {
        if !cfg.scale_factor.is_finite() || cfg.scale_factor <= 1.0 {
            return Err(FastError::InvalidScaleFactor(cfg.scale_factor));
        }
        if cfg.max_levels == 0 {
            return Err(FastError::InvalidLevelCount(cfg.max_levels));
        }
        Ok(())
    }

    /// Lazily produced levels of `img`, at most two buffers alive at a time
    pub fn levels<'a>(
        img: RasterImage<'a>,
        cfg: &PyramidConfig,
        min_working_size: usize,
    ) -> FastResult<PyramidLevels<'a>> {
        let schedule = Self::generate_scale_levels(img.width, img.height, cfg, min_working_size)?;
        if !img.is_consistent() {
            return Err(FastError::InvalidImageData {
                expected_len: img.width * img.height,
                actual_len: img.data.len(),
            });
        }
        Ok(PyramidLevels {
            source: img,
            schedule,
            next: 0,
            current: None,
        })
    }

    /// Build every level up front
    pub fn build<'a>(
        img: RasterImage<'a>,
        cfg: &PyramidConfig,
        min_working_size: usize,
    ) -> FastResult<Vec<PyramidLevel<'a>>> {
        let mut levels = Self::levels(img, cfg, min_working_size)?;
        let mut pyramid = Vec::with_capacity(levels.schedule().len());
        while let Some(level) = levels.advance() {
            pyramid.push(level.clone());
        }
        Ok(pyramid)
    }

    /// Prefilter with a 3-tap binomial kernel, then resample with pixel centres aligned
    pub fn downsample<'a>(prev: &PyramidLevel<'_>, target: ScaleLevel) -> PyramidLevel<'a> {
        let src_width = prev.scale.width;
        let src_height = prev.scale.height;
        let blurred = binomial_blur(prev.view(), &[1, 2, 1]);

        let x_ratio = src_width as f32 / target.width as f32;
        let y_ratio = src_height as f32 / target.height as f32;
        let max_x = (src_width - 1) as f32;
        let max_y = (src_height - 1) as f32;

        let mut downsampled = vec![0u8; target.width * target.height];
        for y in 0..target.height {
            let src_y = ((y as f32 + 0.5) * y_ratio - 0.5).clamp(0.0, max_y);
            for x in 0..target.width {
                let src_x = ((x as f32 + 0.5) * x_ratio - 0.5).clamp(0.0, max_x);
                let value = Self::bilinear_sample(&blurred, src_width, src_height, src_x, src_y);
                downsampled[y * target.width + x] = (value + 0.5).min(255.0) as u8;
            }
        }

        PyramidLevel {
            scale: target,
            data: Cow::Owned(downsampled),
        }
    }

    /// Sample image at fractional coordinates using bilinear interpolation
    fn bilinear_sample(img: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
        let x1 = x.floor() as usize;
        let y1 = y.floor() as usize;
        let x2 = (x1 + 1).min(width - 1);
        let y2 = (y1 + 1).min(height - 1);

        let fx = x - x1 as f32;
        let fy = y - y1 as f32;

        let p11 = img[y1 * width + x1] as f32;
        let p12 = img[y1 * width + x2] as f32;
        let p21 = img[y2 * width + x1] as f32;
        let p22 = img[y2 * width + x2] as f32;

        let interpolated_top = p11 * (1.0 - fx) + p12 * fx;
        let interpolated_bottom = p21 * (1.0 - fx) + p22 * fx;

        interpolated_top * (1.0 - fy) + interpolated_bottom * fy
    }
}

/// Walks the schedule, deriving each level from the one before it
pub struct PyramidLevels<'a> {
    source: RasterImage<'a>,
    schedule: Vec<ScaleLevel>,
    next: usize,
    current: Option<PyramidLevel<'a>>,
}

impl<'a> PyramidLevels<'a> {
    pub fn schedule(&self) -> &[ScaleLevel] {
        &self.schedule
    }

    /// Move to the next level; the previous one is dropped
    pub fn advance(&mut self) -> Option<&PyramidLevel<'a>> {
        let target = *self.schedule.get(self.next)?;
        let level = match self.current.take() {
            None => PyramidLevel {
                scale: target,
                data: Cow::Borrowed(self.source.data),
            },
            Some(prev) => ImagePyramid::downsample(&prev, target),
        };
        self.next += 1;
        self.current = Some(level);
        self.current.as_ref()
    }
}

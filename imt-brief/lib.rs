use imt_core::{binomial_blur, Descriptor, Keypoint, RasterImage, DESCRIPTOR_BYTES, DESCRIPTOR_RADIUS};
use rayon::prelude::*;
use thiserror::Error;

const PATTERN_BITS: usize = DESCRIPTOR_BYTES * 8;
const PATTERN_SEED: u32 = 0x2545_f491;

/// Point pairs `(x1, y1, x2, y2)` compared for each descriptor bit.
///
/// Drawn once at compile time by a fixed-seed xorshift generator, uniformly
/// inside the disc of radius `DESCRIPTOR_RADIUS`, so any rotation of the
/// pattern stays inside the same disc.
pub const PATTERN: [(i8, i8, i8, i8); PATTERN_BITS] = generate_pattern(PATTERN_SEED);

const fn xorshift32(mut state: u32) -> u32 {
    state ^= state << 13;
    state ^= state >> 17;
    state ^= state << 5;
    state
}

/// Next point inside the disc, rejection sampled
const fn next_point(mut state: u32) -> (u32, i8, i8) {
    let r = DESCRIPTOR_RADIUS as i32;
    let side = (2 * r + 1) as u32;
    loop {
        state = xorshift32(state);
        let x = (state % side) as i32 - r;
        state = xorshift32(state);
        let y = (state % side) as i32 - r;
        if x * x + y * y <= r * r {
            return (state, x as i8, y as i8);
        }
    }
}

const fn generate_pattern(seed: u32) -> [(i8, i8, i8, i8); PATTERN_BITS] {
    let mut pattern = [(0i8, 0i8, 0i8, 0i8); PATTERN_BITS];
    let mut state = seed;
    let mut i = 0;
    while i < PATTERN_BITS {
        let (s1, x1, y1) = next_point(state);
        let (s2, x2, y2) = next_point(s1);
        state = s2;
        if x1 == x2 && y1 == y2 {
            continue;
        }
        pattern[i] = (x1, y1, x2, y2);
        i += 1;
    }
    pattern
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BriefError {
    #[error("descriptor sample ({x:.2}, {y:.2}) outside {width}x{height} level")]
    SamplingOutOfBounds {
        x: f32,
        y: f32,
        width: usize,
        height: usize,
    },
    #[error("image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },
}

pub type BriefResult<T> = Result<T, BriefError>;

/// Oriented BRIEF over a 5-tap binomially smoothed level
#[derive(Debug, Clone, Copy, Default)]
pub struct BriefGenerator;

impl BriefGenerator {
    pub fn new() -> Self {
        Self
    }

    /// One descriptor per keypoint, in keypoint order.
    ///
    /// Fails if any rotated sample would read outside the level, which the
    /// detector's border margin rules out.
    pub fn generate_descriptors(&self, img: RasterImage<'_>, kps: &[Keypoint]) -> BriefResult<Vec<Descriptor>> {
        if !img.is_consistent() {
            return Err(BriefError::InvalidImageData {
                expected_len: img.width * img.height,
                actual_len: img.data.len(),
            });
        }
        if kps.is_empty() {
            return Ok(Vec::new());
        }

        let smoothed = binomial_blur(img, &[1, 4, 6, 4, 1]);
        let smoothed = RasterImage::new(img.width, img.height, &smoothed);

        kps.par_iter().map(|kp| self.describe(smoothed, kp)).collect()
    }

    /// Descriptor of a single keypoint on an already smoothed level
    pub fn describe(&self, smoothed: RasterImage<'_>, kp: &Keypoint) -> BriefResult<Descriptor> {
        let (s, c) = kp.angle.sin_cos();
        let (cx, cy) = (kp.x, kp.y);
        let mut d = [0u8; DESCRIPTOR_BYTES];

        for (i, &(dx1, dy1, dx2, dy2)) in PATTERN.iter().enumerate() {
            let (dx1, dy1, dx2, dy2) = (dx1 as f32, dy1 as f32, dx2 as f32, dy2 as f32);
            let (rx1, ry1) = (cx + c * dx1 - s * dy1, cy + s * dx1 + c * dy1);
            let (rx2, ry2) = (cx + c * dx2 - s * dy2, cy + s * dx2 + c * dy2);

            let val1 = Self::bilinear_sample(smoothed, rx1, ry1)?;
            let val2 = Self::bilinear_sample(smoothed, rx2, ry2)?;

            let bit = (val1 < val2) as u8;
            d[i / 8] |= bit << (i % 8);
        }
        Ok(d)
    }

    /// Bilinear interpolation; the 2x2 support must be inside the image
    fn bilinear_sample(img: RasterImage<'_>, x: f32, y: f32) -> BriefResult<f32> {
        let x0 = x.floor();
        let y0 = y.floor();
        if !(x0 >= 0.0 && y0 >= 0.0 && x0 + 1.0 < img.width as f32 && y0 + 1.0 < img.height as f32) {
            return Err(BriefError::SamplingOutOfBounds {
                x,
                y,
                width: img.width,
                height: img.height,
            });
        }

        let dx = x - x0;
        let dy = y - y0;
        let (x0, y0) = (x0 as usize, y0 as usize);
        let w = img.width;

        let p00 = img.data[y0 * w + x0] as f32;
        let p10 = img.data[y0 * w + x0 + 1] as f32;
        let p01 = img.data[(y0 + 1) * w + x0] as f32;
        let p11 = img.data[(y0 + 1) * w + x0 + 1] as f32;

        let top = p00 * (1.0 - dx) + p10 * dx;
        let bottom = p01 * (1.0 - dx) + p11 * dx;

        Ok(top * (1.0 - dy) + bottom * dy)
    }
}

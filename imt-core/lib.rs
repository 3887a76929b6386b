#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Borrowed row-major 8-bit grayscale image
#[derive(Debug, Clone, Copy)]
pub struct RasterImage<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

impl<'a> RasterImage<'a> {
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Self {
        Self { width, height, data }
    }

    /// Buffer length matches the declared dimensions
    pub fn is_consistent(&self) -> bool {
        self.width.checked_mul(self.height) == Some(self.data.len())
    }
}

/// Owned row-major 8-bit grayscale image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Filled with a single intensity
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    /// Intensity is the plain channel mean, alpha ignored.
    pub fn from_rgba8(width: usize, height: usize, rgba: &[u8]) -> Self {
        Self::from_interleaved(width, height, rgba, 4)
    }

    pub fn from_rgb8(width: usize, height: usize, rgb: &[u8]) -> Self {
        Self::from_interleaved(width, height, rgb, 3)
    }

    fn from_interleaved(width: usize, height: usize, src: &[u8], channels: usize) -> Self {
        let data = src
            .chunks_exact(channels)
            .take(width * height)
            .map(|px| ((px[0] as u16 + px[1] as u16 + px[2] as u16) / 3) as u8)
            .collect();
        Self::new(width, height, data)
    }

    pub fn view(&self) -> RasterImage<'_> {
        RasterImage::new(self.width, self.height, &self.data)
    }
}

/// Key-point in level-local pixel coordinates, orientation in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

/// Sign of the corner: centre brighter (local maximum) or darker (local minimum) than its ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Polarity {
    Bright,
    Dark,
}

impl Polarity {
    pub const ALL: [Polarity; 2] = [Polarity::Bright, Polarity::Dark];

    pub fn to_u8(self) -> u8 {
        match self {
            Polarity::Bright => 0,
            Polarity::Dark => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Polarity::Bright),
            1 => Some(Polarity::Dark),
            _ => None,
        }
    }
}

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

pub const DESCRIPTOR_BYTES: usize = 32;

/// Radius of the disc the descriptor sampling pattern lives in
pub const DESCRIPTOR_RADIUS: usize = 12;

/// Largest accepted orientation patch side
pub const MAX_PATCH_SIZE: usize = 4 * DESCRIPTOR_RADIUS + 1;

/// Radius of the FAST Bresenham circle
pub const FAST_RADIUS: usize = 3;

/// Number of differing bits between two descriptors
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    let mut d = 0;
    for (ca, cb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        let mut wa = [0u8; 8];
        let mut wb = [0u8; 8];
        wa.copy_from_slice(ca);
        wb.copy_from_slice(cb);
        d += (u64::from_le_bytes(wa) ^ u64::from_le_bytes(wb)).count_ones();
    }
    d
}

/// Separable binomial blur with clamped edges, `taps` e.g. `[1, 2, 1]` or `[1, 4, 6, 4, 1]`
pub fn binomial_blur(img: RasterImage<'_>, taps: &[u32]) -> Vec<u8> {
    let (w, h) = (img.width, img.height);
    if w == 0 || h == 0 || taps.is_empty() {
        return img.data.to_vec();
    }
    let half = (taps.len() / 2) as isize;
    let norm: u32 = taps.iter().sum::<u32>().max(1);

    let mut horizontal = vec![0u32; w * h];
    for y in 0..h {
        let row = &img.data[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0u32;
            for (k, &t) in taps.iter().enumerate() {
                let xx = (x as isize + k as isize - half).clamp(0, w as isize - 1) as usize;
                acc += t * row[xx] as u32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let total = norm * norm;
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (k, &t) in taps.iter().enumerate() {
                let yy = (y as isize + k as isize - half).clamp(0, h as isize - 1) as usize;
                acc += t * horizontal[yy * w + x];
            }
            out[y * w + x] = ((acc + total / 2) / total) as u8;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PyramidConfig {
    /// Upper bound on the number of levels, the full-resolution level included
    pub max_levels: usize,
    /// Smallest width or height a level may have
    pub min_level_size: usize,
    /// Linear size ratio between consecutive levels
    pub scale_factor: f32,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            max_levels: 12,
            min_level_size: 64,
            // three levels per octave
            scale_factor: 2f32.powf(1.0 / 3.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorConfig {
    pub threshold: u8,
    /// Contiguous ring pixels required by the segment test
    pub arc_length: usize,
    /// Diameter of the orientation patch, odd
    pub patch_size: usize,
    pub nms_radius: f32,
    pub max_keypoints_per_level: usize,
    /// Rank candidates by Harris response instead of the FAST score
    pub harris_response: bool,
    pub subpixel_refinement: bool,
}

impl DetectorConfig {
    /// Distance from every level edge inside which no keypoint is reported.
    ///
    /// Covers the FAST circle, the orientation patch and the descriptor
    /// pattern plus one pixel for bilinear sampling.
    pub fn border_margin(&self) -> usize {
        FAST_RADIUS
            .max(self.patch_size / 2)
            .max(DESCRIPTOR_RADIUS + 1)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            arc_length: 9,
            patch_size: 25,
            nms_radius: 4.0,
            max_keypoints_per_level: 500,
            harris_response: false,
            subpixel_refinement: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IndexConfig {
    /// Children per internal node
    pub branching: usize,
    /// Nodes with at most this many points become leaves
    pub leaf_size: usize,
    /// Random medoid sets tried per split
    pub hypotheses: usize,
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            branching: 8,
            leaf_size: 16,
            hypotheses: 64,
            seed: 0x5eed_1d3a_c0de_b00c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompilerConfig {
    pub pyramid: PyramidConfig,
    pub detector: DetectorConfig,
    pub index: IndexConfig,
    /// Worker threads used inside one image; output does not depend on it
    pub n_threads: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            pyramid: PyramidConfig::default(),
            detector: DetectorConfig::default(),
            index: IndexConfig::default(),
            n_threads: num_cpus::get().max(1),
        }
    }
}

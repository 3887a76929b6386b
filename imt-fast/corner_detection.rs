use imt_core::{DetectorConfig, Keypoint, Polarity, RasterImage};
use rayon::prelude::*;

use crate::types::ScoredKeypoint;
use crate::utils::{has_contiguous_run, ring_mask};

/// Corner detection algorithms (FAST and Harris)
pub struct CornerDetector;

impl CornerDetector {
    /// FAST circle offsets for corner detection, clockwise from the top
    pub const FAST_OFFSETS: [(i32, i32); 16] = [
        (0, -3), (1, -3), (2, -2), (3, -1),
        (3, 0), (3, 1), (2, 2), (1, 3),
        (0, 3), (-1, 3), (-2, 2), (-3, 1),
        (-3, 0), (-3, -1), (-2, -2), (-1, -3),
    ];

    /// Scan every pixel at least `margin` away from the edges.
    ///
    /// Rows are processed in parallel; candidates come back in row-major scan
    /// order regardless of the thread count.
    pub fn detect_candidates(
        img: RasterImage<'_>,
        cfg: &DetectorConfig,
        margin: usize,
    ) -> Vec<ScoredKeypoint> {
        let (width, height) = (img.width, img.height);
        if width < 2 * margin + 1 || height < 2 * margin + 1 {
            return Vec::new();
        }

        (margin..height - margin)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row = Vec::new();
                for x in margin..width - margin {
                    let Some((polarity, fast_score)) =
                        Self::segment_test(img, x, y, cfg.threshold, cfg.arc_length)
                    else {
                        continue;
                    };

                    let response = if cfg.harris_response {
                        Self::compute_harris_response(img, x, y)
                    } else {
                        fast_score
                    };
                    if response <= 0.0 {
                        continue;
                    }

                    row.push(ScoredKeypoint {
                        keypoint: Keypoint {
                            x: x as f32,
                            y: y as f32,
                            angle: 0.0,
                        },
                        response,
                        polarity,
                    });
                }
                row
            })
            .collect()
    }

    /// FAST segment test at `(x, y)`.
    ///
    /// Returns the polarity and the FAST score (summed excess contrast of the
    /// ring pixels past the threshold) when at least `arc_length` contiguous
    /// ring pixels are all brighter or all darker than the centre by more
    /// than `threshold`. Caller guarantees the ring is inside the image.
    pub fn segment_test(
        img: RasterImage<'_>,
        x: usize,
        y: usize,
        threshold: u8,
        arc_length: usize,
    ) -> Option<(Polarity, f32)> {
        let width = img.width;
        let center = img.data[y * width + x] as i32;
        let threshold = threshold as i32;

        let mut ring = [0i32; 16];
        let mut brighter = [false; 16];
        let mut darker = [false; 16];
        for (i, &(dx, dy)) in Self::FAST_OFFSETS.iter().enumerate() {
            let px = (x as i32 + dx) as usize;
            let py = (y as i32 + dy) as usize;
            let q = img.data[py * width + px] as i32;
            ring[i] = q;
            brighter[i] = q > center + threshold;
            darker[i] = q < center - threshold;
        }

        // Ring brighter than the centre makes the centre a local minimum
        if has_contiguous_run(ring_mask(&brighter), arc_length) {
            let score = ring
                .iter()
                .zip(&brighter)
                .filter(|(_, &b)| b)
                .map(|(&q, _)| (q - center - threshold) as f32)
                .sum();
            return Some((Polarity::Dark, score));
        }
        if has_contiguous_run(ring_mask(&darker), arc_length) {
            let score = ring
                .iter()
                .zip(&darker)
                .filter(|(_, &d)| d)
                .map(|(&q, _)| (center - q - threshold) as f32)
                .sum();
            return Some((Polarity::Bright, score));
        }
        None
    }

    /// FAST score or zero when the segment test fails
    pub fn fast_score(img: RasterImage<'_>, x: usize, y: usize, threshold: u8, arc_length: usize) -> f32 {
        Self::segment_test(img, x, y, threshold, arc_length)
            .map(|(_, score)| score)
            .unwrap_or(0.0)
    }

    /// Harris corner response `det(M) - k * trace(M)^2` over a 5x5 window, clipped at zero
    pub fn compute_harris_response(img: RasterImage<'_>, x: usize, y: usize) -> f32 {
        let (width, height) = (img.width, img.height);
        if x < 3 || y < 3 || x + 3 >= width || y + 3 >= height {
            return 0.0;
        }

        let mut ixx = 0.0f64;
        let mut ixy = 0.0f64;
        let mut iyy = 0.0f64;

        for ny in y - 2..=y + 2 {
            for nx in x - 2..=x + 2 {
                let (gx, gy) = Self::compute_gradients(img, nx, ny);
                ixx += (gx * gx) as f64;
                ixy += (gx * gy) as f64;
                iyy += (gy * gy) as f64;
            }
        }

        let k = 0.04f64;
        let det = ixx * iyy - ixy * ixy;
        let trace = ixx + iyy;
        let harris_response = det - k * trace * trace;

        if harris_response > 0.0 {
            harris_response as f32
        } else {
            0.0
        }
    }

    /// Sobel gradients, normalised by 8. Caller keeps `(x, y)` one pixel inside.
    fn compute_gradients(img: RasterImage<'_>, x: usize, y: usize) -> (f32, f32) {
        let w = img.width;
        let p = |xx: usize, yy: usize| img.data[yy * w + xx] as f32;

        let gx = p(x + 1, y - 1) + 2.0 * p(x + 1, y) + p(x + 1, y + 1)
            - p(x - 1, y - 1)
            - 2.0 * p(x - 1, y)
            - p(x - 1, y + 1);

        let gy = p(x - 1, y + 1) + 2.0 * p(x, y + 1) + p(x + 1, y + 1)
            - p(x - 1, y - 1)
            - 2.0 * p(x, y - 1)
            - p(x + 1, y - 1);

        (gx / 8.0, gy / 8.0)
    }
}

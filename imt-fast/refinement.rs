use imt_core::{Keypoint, RasterImage};

use crate::corner_detection::CornerDetector;
use crate::types::ScoredKeypoint;

/// Suppression, ranking, orientation and subpixel refinement of candidates
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Greedy non-maximum suppression.
    ///
    /// Candidates are visited by descending response (stable, so earlier
    /// scan order wins ties); a candidate survives if no survivor lies
    /// closer than `min_distance`. Survivors are returned in visiting order.
    pub fn non_maximum_suppression(
        keypoints: &[ScoredKeypoint],
        min_distance: f32,
        width: usize,
        height: usize,
    ) -> Vec<ScoredKeypoint> {
        if keypoints.is_empty() {
            return Vec::new();
        }

        let mut sorted_keypoints = keypoints.to_vec();
        sorted_keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));

        if min_distance <= 0.0 {
            return sorted_keypoints;
        }

        // Accepted points bucketed on a grid of `min_distance` cells; only
        // the 3x3 neighbourhood of a cell can hold a conflicting survivor.
        let cell = min_distance.ceil().max(1.0);
        let grid_cols = (width as f32 / cell).ceil() as usize + 1;
        let grid_rows = (height as f32 / cell).ceil() as usize + 1;
        let mut grid: Vec<Vec<(f32, f32)>> = vec![Vec::new(); grid_cols * grid_rows];
        let min_distance_sq = min_distance * min_distance;

        let mut suppressed = Vec::new();
        for candidate in sorted_keypoints {
            let (x, y) = (candidate.keypoint.x, candidate.keypoint.y);
            let col = ((x / cell) as usize).min(grid_cols - 1);
            let row = ((y / cell) as usize).min(grid_rows - 1);

            let mut is_local_maximum = true;
            'search: for r in row.saturating_sub(1)..=(row + 1).min(grid_rows - 1) {
                for c in col.saturating_sub(1)..=(col + 1).min(grid_cols - 1) {
                    for &(ax, ay) in &grid[r * grid_cols + c] {
                        let dx = x - ax;
                        let dy = y - ay;
                        if dx * dx + dy * dy < min_distance_sq {
                            is_local_maximum = false;
                            break 'search;
                        }
                    }
                }
            }

            if is_local_maximum {
                grid[row * grid_cols + col].push((x, y));
                suppressed.push(candidate);
            }
        }

        suppressed
    }

    /// Keep the first `max` of a ranked list, then restore row-major scan order
    pub fn retain_strongest(mut ranked: Vec<ScoredKeypoint>, max: usize) -> Vec<ScoredKeypoint> {
        ranked.truncate(max);
        ranked.sort_by(|a, b| {
            a.keypoint
                .y
                .total_cmp(&b.keypoint.y)
                .then(a.keypoint.x.total_cmp(&b.keypoint.x))
        });
        ranked
    }

    /// Intensity-centroid orientation over a disc of radius `patch_size / 2`.
    ///
    /// The disc must lie inside the image; the detector's border margin
    /// guarantees it.
    pub fn compute_orientation(img: RasterImage<'_>, x: f32, y: f32, patch_size: usize) -> f32 {
        let half = (patch_size / 2) as i64;
        let cx = x.round() as i64;
        let cy = y.round() as i64;
        let width = img.width as i64;
        let height = img.height as i64;

        let mut m10 = 0i64;
        let mut m01 = 0i64;
        for dy in -half..=half {
            let yy = cy + dy;
            if yy < 0 || yy >= height {
                continue;
            }
            let span = ((half * half - dy * dy) as f64).sqrt() as i64;
            for dx in -span..=span {
                let xx = cx + dx;
                if xx < 0 || xx >= width {
                    continue;
                }
                let val = img.data[(yy * width + xx) as usize] as i64;
                m10 += dx * val;
                m01 += dy * val;
            }
        }

        (m01 as f32).atan2(m10 as f32)
    }

    /// Refine keypoint to subpixel accuracy by fitting a quadratic to the
    /// FAST score in its 3x3 neighbourhood.
    ///
    /// The refined point is clamped to `[margin, size - 1 - margin]`.
    pub fn refine_keypoint_subpixel(
        img: RasterImage<'_>,
        kp: Keypoint,
        threshold: u8,
        arc_length: usize,
        margin: usize,
    ) -> Keypoint {
        let x = kp.x.round() as usize;
        let y = kp.y.round() as usize;

        // Need the FAST ring of every neighbour inside the image
        if x < 4 || y < 4 || x + 4 >= img.width || y + 4 >= img.height {
            return kp;
        }

        let mut samples = [[0.0f32; 3]; 3];
        for (j, row) in samples.iter_mut().enumerate() {
            for (i, s) in row.iter_mut().enumerate() {
                *s = CornerDetector::fast_score(img, x + i - 1, y + j - 1, threshold, arc_length);
            }
        }

        let dx = (samples[1][2] - samples[1][0]) / 2.0;
        let dy = (samples[2][1] - samples[0][1]) / 2.0;
        let dxx = samples[1][2] - 2.0 * samples[1][1] + samples[1][0];
        let dyy = samples[2][1] - 2.0 * samples[1][1] + samples[0][1];
        let dxy = (samples[2][2] - samples[2][0] - samples[0][2] + samples[0][0]) / 4.0;

        let det = dxx * dyy - dxy * dxy;
        if det.abs() < 1e-6 {
            return kp;
        }

        let offset_x = (-(dyy * dx - dxy * dy) / det).clamp(-0.5, 0.5);
        let offset_y = (-(dxx * dy - dxy * dx) / det).clamp(-0.5, 0.5);

        let lo = margin as f32;
        let hi_x = (img.width - 1 - margin) as f32;
        let hi_y = (img.height - 1 - margin) as f32;

        Keypoint {
            x: (kp.x + offset_x).clamp(lo, hi_x),
            y: (kp.y + offset_y).clamp(lo, hi_y),
            angle: kp.angle,
        }
    }
}

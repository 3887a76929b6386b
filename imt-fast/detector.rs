use imt_core::{DetectorConfig, RasterImage, MAX_PATCH_SIZE};
use log::debug;

use crate::corner_detection::CornerDetector;
use crate::error::{FastError, FastResult};
use crate::refinement::KeypointRefinement;
use crate::types::ScoredKeypoint;

/// FAST keypoint extractor for a single pyramid level
#[derive(Debug, Clone)]
pub struct FastDetector {
    cfg: DetectorConfig,
    margin: usize,
}

impl FastDetector {
    /// Creates a new FAST detector with validation
    pub fn new(cfg: DetectorConfig) -> FastResult<Self> {
        // 0 would accept every pixel, >127 overflows the signed ring comparison range
        if cfg.threshold == 0 || cfg.threshold > 127 {
            return Err(FastError::InvalidThreshold(cfg.threshold));
        }

        if !(9..=16).contains(&cfg.arc_length) {
            return Err(FastError::InvalidArcLength(cfg.arc_length));
        }

        if cfg.patch_size % 2 == 0 || !(3..=MAX_PATCH_SIZE).contains(&cfg.patch_size) {
            return Err(FastError::InvalidPatchSize(cfg.patch_size));
        }

        if !cfg.nms_radius.is_finite() || cfg.nms_radius < 0.0 {
            return Err(FastError::InvalidNmsRadius(cfg.nms_radius));
        }

        let margin = cfg.border_margin();
        Ok(Self { cfg, margin })
    }

    /// Distance from the level edges inside which nothing is reported
    pub fn border_margin(&self) -> usize {
        self.margin
    }

    /// Smallest level side with at least one testable pixel
    pub fn min_image_size(&self) -> usize {
        2 * self.margin + 1
    }

    /// Validates image data before processing
    fn validate_image(&self, img: RasterImage<'_>) -> FastResult<()> {
        if img.width == 0 || img.height == 0 {
            return Err(FastError::InvalidImageSize {
                width: img.width,
                height: img.height,
            });
        }
        if !img.is_consistent() {
            return Err(FastError::InvalidImageData {
                expected_len: img.width * img.height,
                actual_len: img.data.len(),
            });
        }
        Ok(())
    }

    /// Detect oriented keypoints on one level.
    ///
    /// Segment test, non-maximum suppression, cap at
    /// `max_keypoints_per_level` strongest, orientation, optional subpixel
    /// refinement. Output is in row-major scan order. A level too small for
    /// the border margin yields no keypoints.
    pub fn detect(&self, img: RasterImage<'_>) -> FastResult<Vec<ScoredKeypoint>> {
        self.validate_image(img)?;

        let candidates = CornerDetector::detect_candidates(img, &self.cfg, self.margin);
        let candidate_count = candidates.len();

        let ranked = KeypointRefinement::non_maximum_suppression(
            &candidates,
            self.cfg.nms_radius,
            img.width,
            img.height,
        );
        let mut keypoints =
            KeypointRefinement::retain_strongest(ranked, self.cfg.max_keypoints_per_level);

        for sk in keypoints.iter_mut() {
            if self.cfg.subpixel_refinement {
                sk.keypoint = KeypointRefinement::refine_keypoint_subpixel(
                    img,
                    sk.keypoint,
                    self.cfg.threshold,
                    self.cfg.arc_length,
                    self.margin,
                );
            }
            sk.keypoint.angle = KeypointRefinement::compute_orientation(
                img,
                sk.keypoint.x,
                sk.keypoint.y,
                self.cfg.patch_size,
            );
        }

        debug!(
            "{}x{} level: {} candidates, {} keypoints",
            img.width,
            img.height,
            candidate_count,
            keypoints.len()
        );

        Ok(keypoints)
    }

    /// Get detector configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }
}

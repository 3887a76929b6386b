use imt_core::CompilerConfig;

use crate::compiler::Compiler;
use crate::config;
use crate::error::CompileResult;

/// Fluent construction of a [`Compiler`]
#[derive(Debug, Clone, Default)]
pub struct CompilerBuilder {
    config: CompilerConfig,
}

impl CompilerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Set the FAST threshold (1-127)
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.config.detector.threshold = threshold;
        self
    }

    /// Contiguous ring pixels for the segment test (9-16)
    pub fn arc_length(mut self, arc_length: usize) -> Self {
        self.config.detector.arc_length = arc_length;
        self
    }

    /// Set the patch size for orientation calculation
    pub fn patch_size(mut self, patch_size: usize) -> Self {
        self.config.detector.patch_size = patch_size;
        self
    }

    pub fn nms_radius(mut self, radius: f32) -> Self {
        self.config.detector.nms_radius = radius;
        self
    }

    pub fn max_keypoints_per_level(mut self, max: usize) -> Self {
        self.config.detector.max_keypoints_per_level = max;
        self
    }

    /// Enable or disable Harris corner scoring
    pub fn harris_response(mut self, enable: bool) -> Self {
        self.config.detector.harris_response = enable;
        self
    }

    /// Enable or disable subpixel refinement
    pub fn subpixel_refinement(mut self, enable: bool) -> Self {
        self.config.detector.subpixel_refinement = enable;
        self
    }

    pub fn max_levels(mut self, levels: usize) -> Self {
        self.config.pyramid.max_levels = levels;
        self
    }

    pub fn min_level_size(mut self, size: usize) -> Self {
        self.config.pyramid.min_level_size = size;
        self
    }

    pub fn scale_factor(mut self, factor: f32) -> Self {
        self.config.pyramid.scale_factor = factor;
        self
    }

    pub fn branching(mut self, branching: usize) -> Self {
        self.config.index.branching = branching;
        self
    }

    pub fn leaf_size(mut self, leaf_size: usize) -> Self {
        self.config.index.leaf_size = leaf_size;
        self
    }

    pub fn hypotheses(mut self, hypotheses: usize) -> Self {
        self.config.index.hypotheses = hypotheses;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.index.seed = seed;
        self
    }

    /// Set the number of threads for parallel processing
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    /// Apply the fast preset, keeping the thread count
    pub fn preset_fast(mut self) -> Self {
        let n_threads = self.config.n_threads;
        self.config = config::fast_preset();
        self.config.n_threads = n_threads;
        self
    }

    /// Apply the quality preset, keeping the thread count
    pub fn preset_quality(mut self) -> Self {
        let n_threads = self.config.n_threads;
        self.config = config::quality_preset();
        self.config.n_threads = n_threads;
        self
    }

    pub fn summary(&self) -> String {
        config::summary(&self.config)
    }

    pub fn to_config(self) -> CompilerConfig {
        self.config
    }

    /// Validate and build the `Compiler`
    pub fn build(self) -> CompileResult<Compiler> {
        Compiler::new(self.config)
    }
}

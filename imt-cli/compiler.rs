use std::time::Instant;

use imt_brief::{BriefError, BriefGenerator};
use imt_core::{CompilerConfig, Descriptor, Polarity, RasterImage};
use imt_fast::{FastDetector, ImagePyramid, ScaleLevel, ScoredKeypoint};
use imt_index::TargetIndex;
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config;
use crate::error::{CompileError, CompileResult};
use crate::progress::{Progress, ProgressObserver};
use crate::record::{CompiledBundle, LevelRecord, TargetKeypoint, TargetRecord};

/// Compiles reference images into targets.
///
/// Holds only the validated configuration; every call builds its own worker
/// pool and pyramid state, so one `Compiler` can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: CompilerConfig,
    detector: FastDetector,
    brief: BriefGenerator,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> CompileResult<Self> {
        config::validate(&config)?;
        let detector = FastDetector::new(config.detector.clone())
            .map_err(|e| CompileError::Config(e.to_string()))?;
        Ok(Self {
            config,
            detector,
            brief: BriefGenerator::new(),
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `images` in order into one bundle.
    ///
    /// Every image is checked before any pyramid work starts. Progress is
    /// reported per pyramid level plus once per finished target; a
    /// non-empty batch starts at 0 and ends at exactly 100. The first
    /// failure, including an error from the observer, aborts the whole batch.
    pub fn compile(
        &self,
        images: &[RasterImage<'_>],
        observer: Option<&mut dyn ProgressObserver>,
    ) -> CompileResult<CompiledBundle> {
        if images.is_empty() {
            return Ok(CompiledBundle::default());
        }
        let started = Instant::now();

        let schedules = images
            .iter()
            .enumerate()
            .map(|(index, &img)| self.schedule(index, img))
            .collect::<CompileResult<Vec<_>>>()?;
        let total_units: usize = schedules.iter().map(|s| s.len() + 1).sum();

        let pool = self.thread_pool()?;
        let mut progress = Progress::new(observer, total_units);
        progress.start()?;

        let mut targets = Vec::with_capacity(images.len());
        for (index, &img) in images.iter().enumerate() {
            targets.push(self.compile_one(&pool, index, img, &mut progress)?);
        }

        info!(
            "compiled {} targets ({} keypoints) in {:.2?}",
            targets.len(),
            targets.iter().map(TargetRecord::keypoint_count).sum::<usize>(),
            started.elapsed()
        );
        Ok(CompiledBundle { targets })
    }

    /// Compile a single image outside of a batch
    pub fn compile_target(&self, img: RasterImage<'_>) -> CompileResult<TargetRecord> {
        self.schedule(0, img)?;
        let pool = self.thread_pool()?;
        self.compile_one(&pool, 0, img, &mut Progress::silent())
    }

    /// Level schedule of one input, or the reason it cannot be compiled
    fn schedule(&self, index: usize, img: RasterImage<'_>) -> CompileResult<Vec<ScaleLevel>> {
        if u32::try_from(img.width).is_err() || u32::try_from(img.height).is_err() {
            return Err(CompileError::InvalidImage {
                index,
                reason: format!("{}x{} exceeds the bundle's 32-bit dimensions", img.width, img.height),
            });
        }
        if !img.is_consistent() {
            return Err(CompileError::InvalidImage {
                index,
                reason: format!(
                    "buffer holds {} bytes, {}x{} needs {}",
                    img.data.len(),
                    img.width,
                    img.height,
                    img.width.saturating_mul(img.height)
                ),
            });
        }
        ImagePyramid::generate_scale_levels(
            img.width,
            img.height,
            &self.config.pyramid,
            self.detector.min_image_size(),
        )
        .map_err(|e| CompileError::from_fast(index, e))
    }

    fn thread_pool(&self) -> CompileResult<ThreadPool> {
        Ok(ThreadPoolBuilder::new()
            .num_threads(self.config.n_threads)
            .build()?)
    }

    fn compile_one(
        &self,
        pool: &ThreadPool,
        index: usize,
        img: RasterImage<'_>,
        progress: &mut Progress<'_>,
    ) -> CompileResult<TargetRecord> {
        let started = Instant::now();
        let mut pyramid = ImagePyramid::levels(img, &self.config.pyramid, self.detector.min_image_size())
            .map_err(|e| CompileError::from_fast(index, e))?;

        let mut levels = Vec::with_capacity(pyramid.schedule().len());
        while let Some(level) = pyramid.advance() {
            let view = level.view();
            let scale = level.scale;

            let (keypoints, descriptors) = pool.install(|| {
                let keypoints = self
                    .detector
                    .detect(view)
                    .map_err(|e| CompileError::from_fast(index, e))?;
                let oriented: Vec<_> = keypoints.iter().map(|sk| sk.keypoint).collect();
                let descriptors = self
                    .brief
                    .generate_descriptors(view, &oriented)
                    .map_err(|source| sampling_error(index, scale.level, source))?;
                Ok::<_, CompileError>((keypoints, descriptors))
            })?;

            if keypoints.is_empty() {
                warn!("image {index}: level {} ({}x{}) has no keypoints", scale.level, scale.width, scale.height);
            } else {
                debug!(
                    "image {index}: level {} ({}x{}, scale {:.3}) -> {} keypoints",
                    scale.level,
                    scale.width,
                    scale.height,
                    scale.scale,
                    keypoints.len()
                );
            }

            levels.push(level_record(scale, &keypoints, descriptors));
            progress.advance()?;
        }

        let descriptors: Vec<Descriptor> = levels
            .iter()
            .flat_map(|l| l.keypoints.iter().map(|kp| kp.descriptor))
            .collect();
        if descriptors.is_empty() {
            return Err(CompileError::NoFeatures { index });
        }
        let polarities: Vec<Polarity> = levels
            .iter()
            .flat_map(|l| l.keypoints.iter().map(|kp| kp.polarity))
            .collect();

        let target_index = TargetIndex::build(&descriptors, &polarities, &self.config.index)
            .map_err(|source| CompileError::Index { index, source })?;

        let record = TargetRecord {
            width: img.width as u32,
            height: img.height as u32,
            levels,
            index: target_index,
        };
        debug!(
            "image {index}: {}x{}, {} levels, {} keypoints in {:.2?}",
            img.width,
            img.height,
            record.levels.len(),
            record.keypoint_count(),
            started.elapsed()
        );
        progress.advance()?;
        Ok(record)
    }
}

fn sampling_error(index: usize, level: usize, source: BriefError) -> CompileError {
    CompileError::DescriptorSampling { index, level, source }
}

fn level_record(scale: ScaleLevel, keypoints: &[ScoredKeypoint], descriptors: Vec<Descriptor>) -> LevelRecord {
    LevelRecord {
        scale: scale.scale,
        width: scale.width as u32,
        height: scale.height as u32,
        keypoints: keypoints
            .iter()
            .zip(descriptors)
            .map(|(sk, descriptor)| TargetKeypoint {
                x: sk.keypoint.x,
                y: sk.keypoint.y,
                strength: sk.response,
                angle: sk.keypoint.angle,
                polarity: sk.polarity,
                descriptor,
            })
            .collect(),
    }
}

/// One-shot compilation with an explicit configuration
pub fn compile(
    images: &[RasterImage<'_>],
    config: &CompilerConfig,
    observer: Option<&mut dyn ProgressObserver>,
) -> CompileResult<CompiledBundle> {
    Compiler::new(config.clone())?.compile(images, observer)
}

use imt_core::{CompilerConfig, DetectorConfig, IndexConfig, PyramidConfig};
use imt_fast::{FastDetector, ImagePyramid};
use imt_index::ClusterTree;

use crate::error::{CompileError, CompileResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reject settings the pipeline cannot run with, before touching any image
pub fn validate(cfg: &CompilerConfig) -> CompileResult<()> {
    let invalid = |e: &dyn std::fmt::Display| CompileError::Config(e.to_string());

    ImagePyramid::validate_config(&cfg.pyramid).map_err(|e| invalid(&e))?;
    FastDetector::new(cfg.detector.clone()).map_err(|e| invalid(&e))?;
    ClusterTree::validate_config(&cfg.index).map_err(|e| invalid(&e))?;

    if cfg.detector.max_keypoints_per_level == 0 {
        return Err(CompileError::Config(
            "max_keypoints_per_level must be > 0".to_string(),
        ));
    }
    if cfg.n_threads == 0 {
        return Err(CompileError::Config("n_threads must be > 0".to_string()));
    }
    Ok(())
}

/// Fewer levels and keypoints, cheaper index
pub fn fast_preset() -> CompilerConfig {
    CompilerConfig {
        pyramid: PyramidConfig {
            max_levels: 6,
            min_level_size: 96,
            scale_factor: std::f32::consts::SQRT_2,
        },
        detector: DetectorConfig {
            threshold: 30,
            nms_radius: 6.0,
            max_keypoints_per_level: 300,
            ..DetectorConfig::default()
        },
        index: IndexConfig {
            hypotheses: 16,
            ..IndexConfig::default()
        },
        n_threads: num_cpus::get().max(1),
    }
}

/// Denser keypoints, Harris ranking and subpixel positions
pub fn quality_preset() -> CompilerConfig {
    CompilerConfig {
        pyramid: PyramidConfig {
            max_levels: 16,
            min_level_size: 48,
            ..PyramidConfig::default()
        },
        detector: DetectorConfig {
            threshold: 15,
            nms_radius: 3.0,
            max_keypoints_per_level: 1000,
            harris_response: true,
            subpixel_refinement: true,
            ..DetectorConfig::default()
        },
        index: IndexConfig::default(),
        n_threads: num_cpus::get().max(1),
    }
}

pub fn summary(cfg: &CompilerConfig) -> String {
    format!(
        "CompilerConfig: levels<={} (ratio {:.3}, min {}px), FAST-{} threshold={} nms={} cap={}/level, \
         harris={} subpixel={}, index branching={} leaf={} hypotheses={}, threads={}",
        cfg.pyramid.max_levels,
        cfg.pyramid.scale_factor,
        cfg.pyramid.min_level_size,
        cfg.detector.arc_length,
        cfg.detector.threshold,
        cfg.detector.nms_radius,
        cfg.detector.max_keypoints_per_level,
        cfg.detector.harris_response,
        cfg.detector.subpixel_refinement,
        cfg.index.branching,
        cfg.index.leaf_size,
        cfg.index.hypotheses,
        cfg.n_threads
    )
}

#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[error("unrecognised config extension: {0}")]
    UnknownFormat(String),
    #[error(transparent)]
    Invalid(#[from] CompileError),
}

/// Configuration file contents: the compiler settings plus optional labels
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub compiler: CompilerConfig,
}

#[cfg(feature = "serde")]
impl ConfigFile {
    pub fn new(compiler: CompilerConfig) -> Self {
        Self {
            name: None,
            description: None,
            compiler,
        }
    }

    pub fn with_metadata(mut self, name: &str, description: &str) -> Self {
        self.name = Some(name.to_string());
        self.description = Some(description.to_string());
        self
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: Self = serde_json::from_str(json)?;
        validate(&file.compiler)?;
        Ok(file)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(text)?;
        validate(&file.compiler)?;
        Ok(file)
    }

    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Pick the parser from the file extension (`.json` or `.toml`)
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            Some("toml") => Self::load_toml(path),
            other => Err(ConfigError::UnknownFormat(other.unwrap_or("").to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        validate(&CompilerConfig::default()).unwrap();
        validate(&fast_preset()).unwrap();
        validate(&quality_preset()).unwrap();
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = CompilerConfig::default();
        cfg.pyramid.scale_factor = 1.0;
        assert!(matches!(validate(&cfg), Err(CompileError::Config(_))));

        let mut cfg = CompilerConfig::default();
        cfg.detector.patch_size = 24;
        assert!(matches!(validate(&cfg), Err(CompileError::Config(_))));

        let mut cfg = CompilerConfig::default();
        cfg.detector.patch_size = 101;
        assert!(matches!(validate(&cfg), Err(CompileError::Config(_))));

        let mut cfg = CompilerConfig::default();
        cfg.index.branching = 0;
        assert!(matches!(validate(&cfg), Err(CompileError::Config(_))));

        let mut cfg = CompilerConfig::default();
        cfg.n_threads = 0;
        assert!(matches!(validate(&cfg), Err(CompileError::Config(_))));

        let mut cfg = CompilerConfig::default();
        cfg.detector.max_keypoints_per_level = 0;
        assert!(matches!(validate(&cfg), Err(CompileError::Config(_))));
    }

    #[test]
    fn test_summary_mentions_key_settings() {
        let s = summary(&CompilerConfig::default());
        assert!(s.contains("FAST-9"));
        assert!(s.contains("threshold=20"));
        assert!(s.contains("branching=8"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip() {
        let file = ConfigFile::new(quality_preset()).with_metadata("Quality", "dense targets");
        let json = file.to_json().unwrap();
        assert!(json.contains("\"harris_response\": true"));
        assert_eq!(ConfigFile::from_json(&json).unwrap(), file);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_round_trip() {
        let file = ConfigFile::new(CompilerConfig::default());
        let text = file.to_toml().unwrap();
        assert!(!text.contains("name"));
        assert_eq!(ConfigFile::from_toml(&text).unwrap(), file);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_toml_uses_defaults() {
        let file = ConfigFile::from_toml("[compiler.detector]\nthreshold = 35\n").unwrap();
        assert_eq!(file.compiler.detector.threshold, 35);
        assert_eq!(file.compiler.detector.arc_length, 9);
        assert_eq!(file.compiler.index, IndexConfig::default());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_invalid_file_is_rejected() {
        let result = ConfigFile::from_toml("[compiler.detector]\nthreshold = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(CompileError::Config(_)))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_save_and_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::new(fast_preset()).with_metadata("Fast", "quick compile");

        let json_path = dir.path().join("imt.json");
        file.save_json(&json_path).unwrap();
        assert_eq!(ConfigFile::load(&json_path).unwrap(), file);

        let toml_path = dir.path().join("imt.toml");
        file.save_toml(&toml_path).unwrap();
        assert_eq!(ConfigFile::load(&toml_path).unwrap(), file);

        assert!(matches!(
            ConfigFile::load(dir.path().join("imt.yaml")),
            Err(ConfigError::UnknownFormat(_))
        ));
    }
}

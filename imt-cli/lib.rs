//! Offline image-target compiler.
//!
//! Turns reference images into a [`CompiledBundle`]: per image a FAST/BRIEF
//! feature set over a scale pyramid plus a clustering index for matching,
//! exported in a versioned little-endian format.
//!
//! ```no_run
//! use imt_cli::{compile, CompilerConfig, GrayImage, ProgressResult};
//!
//! let img = GrayImage::filled(320, 240, 0);
//! let mut report = |p: f64| -> ProgressResult {
//!     println!("{p:.1}%");
//!     Ok(())
//! };
//! let bundle = compile(&[img.view()], &CompilerConfig::default(), Some(&mut report))?;
//! std::fs::write("targets.imt", bundle.to_bytes())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod format;
pub mod input;
pub mod progress;
pub mod record;

pub use builder::CompilerBuilder;
pub use compiler::{compile, Compiler};
pub use error::{CompileError, CompileResult, FormatError};
pub use format::{FORMAT_VERSION, MAGIC};
pub use progress::{ProgressError, ProgressEvent, ProgressObserver, ProgressResult};
pub use record::{CompiledBundle, LevelRecord, TargetKeypoint, TargetRecord};

pub use imt_core::{self, CompilerConfig, DetectorConfig, GrayImage, IndexConfig, Polarity, PyramidConfig, RasterImage};

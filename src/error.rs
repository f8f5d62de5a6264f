//! Error types for the visual-regression engine.
//!
//! Only caller-fixable identity problems and structural raster mismatches are
//! "expected" errors. Everything else here is infrastructure failing underneath a
//! pipeline (disk, PNG codec, capture driver) and is surfaced with context.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collaborators::CaptureError;

/// Result type alias using [`VisualError`].
pub type Result<T> = std::result::Result<T, VisualError>;

#[derive(Error, Debug)]
pub enum VisualError {
    /// The identity lacks a partitioning field. Raised before any I/O.
    #[error("artifact identity is missing required dimension `{dimension}`")]
    MissingDimension { dimension: &'static str },

    #[error("threshold must be a finite value within [0, 1], got {0}")]
    InvalidThreshold(f64),

    /// Baseline and actual rasters have different sizes. Signals a structural change
    /// (viewport, layout height) rather than a rendering regression.
    #[error(
        "image size mismatch: baseline is {}x{}, actual is {}x{}",
        .baseline.0, .baseline.1, .actual.0, .actual.1
    )]
    DimensionMismatch {
        baseline: (u32, u32),
        actual: (u32, u32),
    },

    #[error("raster buffer of {len} bytes does not describe a {width}x{height} RGBA image")]
    InvalidRaster { width: u32, height: u32, len: usize },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("comparison task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl VisualError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        VisualError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the error is one of the two kinds a caller is expected to act on.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            VisualError::MissingDimension { .. } | VisualError::DimensionMismatch { .. }
        )
    }
}

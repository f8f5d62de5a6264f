//! Run configuration.
//!
//! One explicit value, handed to the pipeline at construction. Nothing in the
//! engine reads ambient global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core_modules::baseline_store::baseline_store::BaselineMode;
use crate::core_modules::blob_detector::blob_detector::DEFAULT_MIN_REGION_SIZE;
use crate::core_modules::pixel_diff::pixel_diff::{DiffBackdrop, validate_threshold};
use crate::error::{Result, VisualError};

pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 30_000;

/// Configuration for a visual test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Directory holding `baseline/`, `actual/`, `diff/` and `reports/`.
    pub artifact_root: PathBuf,

    /// Threshold used when a test does not supply its own.
    pub default_threshold: f64,

    /// Smallest cluster of difference pixels that counts as a region.
    pub min_region_size: usize,

    /// Ask the enrichment service to explain failing comparisons.
    pub enable_enrichment: bool,

    /// Replace every baseline with the current capture.
    pub update_baseline: bool,

    /// How long a capture may take before the test is skipped.
    pub capture_timeout_ms: u64,

    /// Concurrent tests in a suite. `None` uses the CPU count.
    pub max_parallel: Option<usize>,

    pub diff_backdrop: DiffBackdrop,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("."),
            default_threshold: DEFAULT_THRESHOLD,
            min_region_size: DEFAULT_MIN_REGION_SIZE,
            enable_enrichment: false,
            update_baseline: false,
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
            max_parallel: None,
            diff_backdrop: DiffBackdrop::default(),
        }
    }
}

impl VisualConfig {
    /// Load configuration from a TOML file, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| VisualError::io(path, e))?;
            toml::from_str::<Self>(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.default_threshold)?;
        if self.capture_timeout_ms == 0 {
            return Err(VisualError::InvalidConfig(
                "capture_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_parallel == Some(0) {
            return Err(VisualError::InvalidConfig(
                "max_parallel must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn baseline_mode(&self) -> BaselineMode {
        if self.update_baseline {
            BaselineMode::Update
        } else {
            BaselineMode::Preserve
        }
    }

    pub fn parallelism(&self) -> usize {
        self.max_parallel.unwrap_or_else(num_cpus::get).max(1)
    }

    /// A test's own threshold if it has one, else the configured default.
    pub fn resolve_threshold(&self, test_threshold: Option<f64>) -> Result<f64> {
        validate_threshold(test_threshold.unwrap_or(self.default_threshold))
    }
}

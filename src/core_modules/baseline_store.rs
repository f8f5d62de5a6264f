// THEORY:
// The baseline store governs the accepted reference raster of each identity.
// A baseline is established once, on the first successful capture, by copying the
// captured bytes verbatim; nothing re-encodes it, so the reference is bit-identical
// to what the capture adapter produced. After that it is never mutated unless the
// caller explicitly runs in update mode.

pub mod baseline_store {
    use serde::{Deserialize, Serialize};
    use tracing::{debug, info, warn};

    use crate::core_modules::artifact_paths::{ArtifactPaths, write_creating_dirs};
    use crate::core_modules::raster::RasterImage;
    use crate::error::{Result, VisualError};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum BaselineMode {
        /// Keep an existing baseline untouched.
        #[default]
        Preserve,
        /// Replace the baseline with every new capture.
        Update,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum BaselineAction {
        Created,
        Updated,
        /// A baseline already existed and `BaselineMode::Preserve` left it alone.
        Retained,
    }

    pub async fn has_baseline(paths: &ArtifactPaths) -> Result<bool> {
        tokio::fs::try_exists(&paths.baseline)
            .await
            .map_err(|e| VisualError::io(&paths.baseline, e))
    }

    /// Copies the captured bytes to the baseline location.
    /// Safe to call repeatedly: without update mode an existing baseline is retained.
    pub async fn establish_baseline(
        paths: &ArtifactPaths,
        actual_png: &[u8],
        mode: BaselineMode,
    ) -> Result<BaselineAction> {
        let exists = has_baseline(paths).await?;
        let action = match (exists, mode) {
            (false, _) => BaselineAction::Created,
            (true, BaselineMode::Update) => BaselineAction::Updated,
            (true, BaselineMode::Preserve) => {
                warn!(key = %paths.key, "baseline already exists, keeping it");
                return Ok(BaselineAction::Retained);
            }
        };

        write_creating_dirs(&paths.baseline, actual_png).await?;
        info!(key = %paths.key, ?action, "baseline established");
        Ok(action)
    }

    pub async fn load_baseline(paths: &ArtifactPaths) -> Result<RasterImage> {
        debug!(path = %paths.baseline.display(), "loading baseline");
        let bytes = tokio::fs::read(&paths.baseline)
            .await
            .map_err(|e| VisualError::io(&paths.baseline, e))?;
        RasterImage::from_png(&bytes)
    }
}

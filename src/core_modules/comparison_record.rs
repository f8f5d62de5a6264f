// THEORY:
// The comparison record is the evidence a run leaves behind. A failing visual test
// must never be a bare boolean: it leaves a difference raster next to a JSON record
// that states how big the failure is (pixel count, percentage, region count) and
// under which threshold it was judged.
//
// Records are keyed by identity and are not versioned. `record` always clears the
// previous record, diff raster and annotation of the identity before writing, so
// repeated executions are idempotent and the directory only ever reflects the
// latest run. The report generator reads them back with `load_all`.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_modules::artifact_paths::ArtifactIdentity;
use crate::core_modules::smart_blob::SmartBlob;

/// One comparison outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    /// The artifact file stem, which is what reports display.
    pub name: String,
    pub identity: ArtifactIdentity,
    pub mismatch_count: u64,
    pub mismatch_percent: f64,
    pub region_count: usize,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Why the run aborted, for runs that ended in an error after identity resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The regions behind `region_count`, in scan order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<SmartBlob>,
}

impl ComparisonRecord {
    pub fn compared(
        identity: &ArtifactIdentity,
        name: impl Into<String>,
        mismatch_count: u64,
        mismatch_percent: f64,
        regions: Vec<SmartBlob>,
        threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            identity: identity.clone(),
            mismatch_count,
            mismatch_percent,
            region_count: regions.len(),
            threshold,
            timestamp: Utc::now(),
            skipped: false,
            skip_reason: None,
            error: None,
            regions,
        }
    }

    pub fn skipped(identity: &ArtifactIdentity, name: impl Into<String>, threshold: f64, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: identity.clone(),
            mismatch_count: 0,
            mismatch_percent: 0.0,
            region_count: 0,
            threshold,
            timestamp: Utc::now(),
            skipped: true,
            skip_reason: Some(reason.into()),
            error: None,
            regions: Vec::new(),
        }
    }

    /// A run that ended in an error. Carries no mismatch data.
    pub fn aborted(identity: &ArtifactIdentity, name: impl Into<String>, threshold: f64, error: impl Display) -> Self {
        Self {
            name: name.into(),
            identity: identity.clone(),
            mismatch_count: 0,
            mismatch_percent: 0.0,
            region_count: 0,
            threshold,
            timestamp: Utc::now(),
            skipped: false,
            skip_reason: None,
            error: Some(error.to_string()),
            regions: Vec::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }

    /// Equality on everything except the timestamp.
    pub fn same_findings(&self, other: &ComparisonRecord) -> bool {
        self.name == other.name
            && self.identity == other.identity
            && self.mismatch_count == other.mismatch_count
            && self.mismatch_percent == other.mismatch_percent
            && self.region_count == other.region_count
            && self.threshold == other.threshold
            && self.skipped == other.skipped
            && self.skip_reason == other.skip_reason
            && self.error == other.error
            && self.regions == other.regions
    }
}

pub mod metadata_recorder {
    use std::path::Path;

    use tracing::debug;

    use super::ComparisonRecord;
    use crate::collaborators::Annotation;
    use crate::core_modules::artifact_paths::{ArtifactPaths, ArtifactResolver, remove_if_exists, write_creating_dirs};
    use crate::core_modules::raster::RasterImage;
    use crate::error::{Result, VisualError};

    /// Removes the record, diff raster and annotation of an identity.
    pub async fn clear(paths: &ArtifactPaths) -> Result<()> {
        let mut removed = 0;
        for path in [&paths.diff, &paths.metadata, &paths.annotation] {
            if remove_if_exists(path).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(key = %paths.key, removed, "cleared stale comparison artifacts");
        }
        Ok(())
    }

    /// Replaces the identity's evidence with `record` and `diff_raster`.
    /// Returns the encoded diff raster so callers can hand it on without a re-read.
    pub async fn record(paths: &ArtifactPaths, record: &ComparisonRecord, diff_raster: &RasterImage) -> Result<Vec<u8>> {
        clear(paths).await?;
        let diff_png = diff_raster.to_png()?;
        write_creating_dirs(&paths.diff, &diff_png).await?;
        write_json(&paths.metadata, record).await?;
        debug!(key = %paths.key, mismatches = record.mismatch_count, "comparison recorded");
        Ok(diff_png)
    }

    /// Replaces the identity's evidence with a raster-less record (a skip or an
    /// aborted run).
    pub async fn record_skip(paths: &ArtifactPaths, record: &ComparisonRecord) -> Result<()> {
        clear(paths).await?;
        write_json(&paths.metadata, record).await
    }

    pub async fn load(paths: &ArtifactPaths) -> Result<Option<ComparisonRecord>> {
        read_json(&paths.metadata).await
    }

    /// Every record under the resolver's root, ordered by browser then file name.
    pub async fn load_all(resolver: &ArtifactResolver) -> Result<Vec<ComparisonRecord>> {
        let mut records = Vec::new();
        for browser_dir in sorted_entries(&resolver.diff_dir()).await? {
            if !tokio::fs::metadata(&browser_dir)
                .await
                .map_err(|e| VisualError::io(&browser_dir, e))?
                .is_dir()
            {
                continue;
            }
            for file in sorted_entries(&browser_dir).await? {
                if file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(record) = read_json::<ComparisonRecord>(&file).await? {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub async fn write_annotation(paths: &ArtifactPaths, annotation: &Annotation) -> Result<()> {
        write_json(&paths.annotation, annotation).await
    }

    pub async fn load_annotation(paths: &ArtifactPaths) -> Result<Option<Annotation>> {
        read_json(&paths.annotation).await
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_creating_dirs(path, &bytes).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VisualError::io(path, e)),
        }
    }

    async fn sorted_entries(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VisualError::io(dir, e)),
        };
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| VisualError::io(dir, e))? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }
}

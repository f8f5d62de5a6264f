//! The shipped report generator.
//!
//! Reads every persisted comparison record (and its annotation, when one exists)
//! back from the artifact root and writes one JSON summary to
//! `reports/summary.json`. Because it always rebuilds from disk, it can run after
//! every test without accumulating state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::collaborators::{Annotation, ReportGenerator};
use crate::core_modules::artifact_paths::{ArtifactResolver, write_creating_dirs};
use crate::core_modules::comparison_record::{ComparisonRecord, metadata_recorder};
use crate::error::Result;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    pub total: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub passed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    #[serde(flatten)]
    pub record: ComparisonRecord,
    pub annotation: Annotation,
    /// True when `annotation` was derived from the record rather than loaded.
    pub annotation_is_default: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub totals: ReportTotals,
    pub results: Vec<ReportEntry>,
}

impl SummaryReport {
    pub fn from_entries(results: Vec<ReportEntry>) -> Self {
        let mut totals = ReportTotals {
            total: results.len(),
            ..ReportTotals::default()
        };
        for entry in &results {
            if entry.record.is_aborted() {
                totals.errored += 1;
            } else if entry.record.skipped {
                totals.skipped += 1;
            } else if entry.record.mismatch_count > 0 {
                totals.failed += 1;
            } else {
                totals.passed += 1;
            }
        }
        Self {
            generated_at: Utc::now(),
            totals,
            results,
        }
    }
}

pub struct SummaryReportGenerator {
    resolver: ArtifactResolver,
    /// Concurrent tests trigger generation; writes of the summary file must not interleave.
    write_lock: Mutex<()>,
}

impl SummaryReportGenerator {
    pub fn new(resolver: ArtifactResolver) -> Self {
        Self {
            resolver,
            write_lock: Mutex::new(()),
        }
    }

    pub fn summary_path(&self) -> std::path::PathBuf {
        self.resolver.reports_dir().join(SUMMARY_FILE)
    }

    /// Builds the summary from what is currently on disk.
    pub async fn collect(&self) -> Result<SummaryReport> {
        let mut results = Vec::new();
        for record in metadata_recorder::load_all(&self.resolver).await? {
            let loaded = match self.resolver.resolve(&record.identity) {
                Ok(paths) => metadata_recorder::load_annotation(&paths).await?,
                Err(_) => None,
            };
            let annotation_is_default = loaded.is_none();
            let annotation = loaded.unwrap_or_else(|| Annotation::placeholder_for(&record));
            results.push(ReportEntry {
                record,
                annotation,
                annotation_is_default,
            });
        }
        Ok(SummaryReport::from_entries(results))
    }
}

#[async_trait]
impl ReportGenerator for SummaryReportGenerator {
    async fn generate(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let report = self.collect().await?;
        let path = self.summary_path();
        write_creating_dirs(&path, &serde_json::to_vec_pretty(&report)?).await?;
        debug!(path = %path.display(), total = report.totals.total, "summary report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Severity;
    use crate::core_modules::artifact_paths::ArtifactIdentity;
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::raster::RasterImage;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn empty_root_produces_an_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let generator = SummaryReportGenerator::new(ArtifactResolver::new(dir.path()));
        generator.generate().await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(generator.summary_path()).unwrap()).unwrap();
        assert_eq!(written["totals"]["total"], 0);
        assert_eq!(written["results"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn summary_counts_and_annotates_each_record() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(dir.path());
        let raster = RasterImage::filled(1, 1, Pixel::TRANSPARENT);

        let failing = ArtifactIdentity::new("cart", "chromium");
        let failing_paths = resolver.resolve(&failing).unwrap();
        let record = ComparisonRecord::compared(&failing, "cart", 1, 100.0, Vec::new(), 0.1);
        metadata_recorder::record(&failing_paths, &record, &raster).await.unwrap();
        metadata_recorder::write_annotation(&failing_paths, &Annotation::fallback("offline"))
            .await
            .unwrap();

        let hidden = ArtifactIdentity::new("banner", "chromium");
        let hidden_paths = resolver.resolve(&hidden).unwrap();
        let skip = ComparisonRecord::skipped(&hidden, "banner", 0.1, "Element not visible or not found");
        metadata_recorder::record_skip(&hidden_paths, &skip).await.unwrap();

        let report = SummaryReportGenerator::new(resolver).collect().await.unwrap();
        assert_eq!(
            report.totals,
            ReportTotals {
                total: 2,
                failed: 1,
                skipped: 1,
                errored: 0,
                passed: 0,
            }
        );
        // Sorted by file name within the browser partition.
        assert_eq!(report.results[0].record.name, "banner");
        assert!(report.results[0].annotation_is_default);
        assert_eq!(report.results[1].annotation.severity, Severity::Unknown);
        assert!(!report.results[1].annotation_is_default);
    }
}

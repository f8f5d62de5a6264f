// THEORY:
// The `pipeline` module is the top-level API of the engine. It ties capture,
// baseline resolution, pixel comparison, region clustering, optional enrichment
// and reporting into one deterministic flow per test execution.
//
// The flow is a small state machine:
//
//     Captured -> Skipped             -> Passed
//              -> BaselineEstablished -> Passed
//              -> Compared            -> Passed | Failed
//
// Key architectural principles:
// 1.  **Skips and first runs pass**: An unobservable target is surfaced for review,
//     never failed. The first observation of an identity becomes its baseline and
//     passes without a comparison. Both are product contracts, not fallbacks.
// 2.  **Evidence over booleans**: A failing comparison always leaves a diff raster
//     and a record with its magnitude. A clean comparison leaves nothing behind.
// 3.  **Reports are never stale**: The report generator is triggered on every
//     terminal path, including hard errors, after the record for the run is final.
// 4.  **Only contract violations escape**: Missing identity dimensions and raster
//     size mismatches (plus infrastructure failures) are returned as errors after
//     the aborted run is recorded (and annotated, when enrichment is enabled) and
//     the report is triggered. Everything else resolves to a verdict.
// 5.  **Pure work off the runtime**: The diff and clustering stages are CPU-bound and
//     run on the blocking pool; capture, enrichment and file I/O are the only
//     suspension points.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::collaborators::{Capture, CaptureAdapter, CaptureError, EnrichmentService, ReportGenerator};
use crate::config::VisualConfig;
use crate::core_modules::artifact_paths::{ArtifactPaths, ArtifactResolver, write_creating_dirs};
use crate::core_modules::baseline_store::baseline_store::{self, BaselineAction, BaselineMode};
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::comparison_record::metadata_recorder;
use crate::core_modules::pixel_diff::pixel_diff::{self, DiffOptions};
use crate::core_modules::raster::RasterImage;
use crate::error::{Result, VisualError};

// Re-export key data structures for the public API.
pub use crate::collaborators::Annotation;
pub use crate::core_modules::artifact_paths::{ArtifactIdentity, CaptureTarget};
pub use crate::core_modules::comparison_record::ComparisonRecord;
pub use crate::core_modules::smart_blob::SmartBlob;

/// Reason recorded when the capture adapter reports the target as not visible.
pub const NOT_VISIBLE_REASON: &str = "Element not visible or not found";

/// States a single test execution moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestState {
    Captured,
    Skipped,
    BaselineEstablished,
    Compared,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

/// The primary output of the pipeline for one test.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub identity: ArtifactIdentity,
    pub verdict: Verdict,
    /// Every state visited, in order. The last entry is `Passed` or `Failed`.
    pub transitions: Vec<TestState>,
    /// The comparison record of the run. Persisted for skips and failures; a clean
    /// comparison returns it without persisting it.
    pub record: Option<ComparisonRecord>,
    pub baseline_action: Option<BaselineAction>,
    pub annotation: Option<Annotation>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn skipped(&self) -> bool {
        self.transitions.contains(&TestState::Skipped)
    }

    pub fn baseline_established(&self) -> bool {
        self.transitions.contains(&TestState::BaselineEstablished)
    }
}

/// One visual assertion: an identity, how to capture it, and an optional threshold.
#[derive(Clone)]
pub struct VisualTest {
    pub identity: ArtifactIdentity,
    pub threshold: Option<f64>,
    capture: Arc<dyn CaptureAdapter>,
}

impl VisualTest {
    pub fn new(identity: ArtifactIdentity, capture: Arc<dyn CaptureAdapter>) -> Self {
        Self {
            identity,
            threshold: None,
            capture,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

impl std::fmt::Debug for VisualTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualTest")
            .field("identity", &self.identity)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

enum CaptureResolution {
    Captured(Vec<u8>),
    Skipped(String),
}

/// The main, top-level struct for the engine.
pub struct VisualPipeline {
    config: VisualConfig,
    resolver: ArtifactResolver,
    enrichment: Option<Arc<dyn EnrichmentService>>,
    reporter: Option<Arc<dyn ReportGenerator>>,
    /// Serializes concurrent runs against the same identity within this process.
    identity_locks: IdentityLocks,
}

impl VisualPipeline {
    pub fn new(config: VisualConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: ArtifactResolver::new(config.artifact_root.clone()),
            config,
            enrichment: None,
            reporter: None,
            identity_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_enrichment(mut self, enrichment: Arc<dyn EnrichmentService>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn with_report_generator(mut self, reporter: Arc<dyn ReportGenerator>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &VisualConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ArtifactResolver {
        &self.resolver
    }

    /// Runs one test to a terminal state.
    pub async fn run(&self, test: &VisualTest) -> Result<TestOutcome> {
        // Identity and threshold problems are raised before any I/O.
        let paths = self.resolver.resolve(&test.identity)?;
        let threshold = self.config.resolve_threshold(test.threshold)?;

        let lease = self.lease_identity(&paths.key);
        let _guard = lease.lock.lock().await;

        match self.execute(test, &paths, threshold).await {
            Ok(outcome) => {
                self.trigger_report(&paths).await;
                Ok(outcome)
            }
            Err(err) => {
                error!(key = %paths.key, error = %err, "visual test aborted");
                self.record_abort(&test.identity, &paths, threshold, &err).await;
                self.trigger_report(&paths).await;
                Err(err)
            }
        }
    }

    async fn execute(&self, test: &VisualTest, paths: &ArtifactPaths, threshold: f64) -> Result<TestOutcome> {
        let identity = &test.identity;
        let mut transitions = vec![TestState::Captured];

        // Evidence from an earlier run must not survive into this one.
        metadata_recorder::clear(paths).await?;

        // Stage 1: Capture
        let actual_png = match self.capture(test).await? {
            CaptureResolution::Captured(bytes) => bytes,
            CaptureResolution::Skipped(reason) => {
                warn!(key = %paths.key, %reason, "target unavailable, skipping");
                let record = ComparisonRecord::skipped(identity, &paths.artifact_name, threshold, reason);
                metadata_recorder::record_skip(paths, &record).await?;
                transitions.extend([TestState::Skipped, TestState::Passed]);
                return Ok(TestOutcome {
                    identity: identity.clone(),
                    verdict: Verdict::Passed,
                    transitions,
                    record: Some(record),
                    baseline_action: None,
                    annotation: None,
                });
            }
        };
        let actual = RasterImage::from_png(&actual_png)?;
        write_creating_dirs(&paths.actual, &actual_png).await?;
        debug!(key = %paths.key, width = actual.width(), height = actual.height(), "actual captured");

        // Stage 2: Baseline Resolution
        let mode = self.config.baseline_mode();
        if mode == BaselineMode::Update || !baseline_store::has_baseline(paths).await? {
            let action = baseline_store::establish_baseline(paths, &actual_png, mode).await?;
            info!(key = %paths.key, ?action, "first observation passes without comparison");
            transitions.extend([TestState::BaselineEstablished, TestState::Passed]);
            return Ok(TestOutcome {
                identity: identity.clone(),
                verdict: Verdict::Passed,
                transitions,
                record: None,
                baseline_action: Some(action),
                annotation: None,
            });
        }
        let baseline = baseline_store::load_baseline(paths).await?;

        // Stage 3: Pixel Comparison and Region Clustering
        let options = DiffOptions::new(threshold)?.with_backdrop(self.config.diff_backdrop);
        let min_region_size = self.config.min_region_size;
        let (diff, regions) = tokio::task::spawn_blocking(move || -> Result<_> {
            let diff = pixel_diff::diff(&baseline, &actual, &options)?;
            let regions = if diff.is_clean() {
                Vec::new()
            } else {
                blob_detector::find_regions(&diff.diff_raster, min_region_size)
            };
            Ok((diff, regions))
        })
        .await??;
        transitions.push(TestState::Compared);

        let record = ComparisonRecord::compared(
            identity,
            &paths.artifact_name,
            diff.mismatch_count,
            diff.mismatch_percent(),
            regions,
            threshold,
        );

        // Stage 4: Verdict
        if diff.is_clean() {
            metadata_recorder::clear(paths).await?;
            info!(key = %paths.key, "no visual differences");
            transitions.push(TestState::Passed);
            return Ok(TestOutcome {
                identity: identity.clone(),
                verdict: Verdict::Passed,
                transitions,
                record: Some(record),
                baseline_action: None,
                annotation: None,
            });
        }

        let diff_png = metadata_recorder::record(paths, &record, &diff.diff_raster).await?;
        info!(
            key = %paths.key,
            mismatches = record.mismatch_count,
            percent = record.mismatch_percent,
            regions = record.region_count,
            "visual differences found"
        );

        // Stage 5: Optional Enrichment
        let annotation = if self.config.enable_enrichment {
            let annotation = self.enrich(&diff_png, &record).await;
            self.persist_annotation(paths, &annotation).await;
            Some(annotation)
        } else {
            None
        };

        transitions.push(TestState::Failed);
        Ok(TestOutcome {
            identity: identity.clone(),
            verdict: Verdict::Failed,
            transitions,
            record: Some(record),
            baseline_action: None,
            annotation,
        })
    }

    async fn capture(&self, test: &VisualTest) -> Result<CaptureResolution> {
        let target = test.identity.target();
        let timeout = self.config.capture_timeout();
        match tokio::time::timeout(timeout, test.capture.capture(&target)).await {
            Ok(Ok(Capture::Raster(bytes))) => Ok(CaptureResolution::Captured(bytes)),
            Ok(Ok(Capture::NotVisible)) => Ok(CaptureResolution::Skipped(NOT_VISIBLE_REASON.to_string())),
            Ok(Err(CaptureError::Timeout(elapsed))) => Ok(CaptureResolution::Skipped(format!(
                "Capture timed out after {elapsed:?}"
            ))),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Ok(CaptureResolution::Skipped(format!(
                "Capture timed out after {timeout:?}"
            ))),
        }
    }

    /// Never fails: errors and a missing service degrade to a fallback annotation.
    async fn enrich(&self, diff_png: &[u8], record: &ComparisonRecord) -> Annotation {
        let Some(service) = &self.enrichment else {
            warn!(name = %record.name, "enrichment enabled but no service configured");
            return Annotation::fallback("No enrichment service configured.");
        };
        match service.annotate(diff_png, record).await {
            Ok(annotation) => annotation,
            Err(err) => {
                warn!(name = %record.name, error = %err, "enrichment failed, using fallback");
                Annotation::fallback(err)
            }
        }
    }

    async fn persist_annotation(&self, paths: &ArtifactPaths, annotation: &Annotation) {
        if let Err(err) = metadata_recorder::write_annotation(paths, annotation).await {
            warn!(key = %paths.key, error = %err, "could not persist annotation");
        }
    }

    /// Error-path evidence: an aborted record, plus an annotation explaining the
    /// abort when enrichment is enabled. Best effort; the original error wins.
    async fn record_abort(&self, identity: &ArtifactIdentity, paths: &ArtifactPaths, threshold: f64, err: &VisualError) {
        let record = ComparisonRecord::aborted(identity, &paths.artifact_name, threshold, err);
        if let Err(write_err) = metadata_recorder::record_skip(paths, &record).await {
            warn!(key = %paths.key, error = %write_err, "could not record the aborted run");
            return;
        }
        if self.config.enable_enrichment {
            self.persist_annotation(paths, &Annotation::aborted(err)).await;
        }
    }

    async fn trigger_report(&self, paths: &ArtifactPaths) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        if let Err(err) = reporter.generate().await {
            warn!(key = %paths.key, error = %err, "report generation failed");
        }
    }

    fn lease_identity(&self, key: &str) -> IdentityLease<'_> {
        let mut locks = self.identity_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        IdentityLease {
            locks: &self.identity_locks,
            key: key.to_string(),
            lock: locks.entry(key.to_string()).or_default().clone(),
        }
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.identity_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

type IdentityLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// A handle on one identity's lock. The map entry is dropped together with the
/// last lease, so the map only holds identities that are currently running.
struct IdentityLease<'a> {
    locks: &'a IdentityLocks,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for IdentityLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Two strong references: the map's and this lease's.
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            locks.remove(&self.key);
        }
    }
}

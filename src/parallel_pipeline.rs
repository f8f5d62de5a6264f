// THEORY:
// The suite runner executes many independent visual tests at once. Every test owns
// its own artifacts, so tests for different identities never contend; runs that
// resolve to the same identity are serialized inside `VisualPipeline`.
//
// Concurrency is bounded by `VisualConfig::parallelism`. The heavy stages already
// run on the blocking pool, so the suite only has to keep enough test futures in
// flight to saturate it.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::error::VisualError;
use crate::pipeline::{ArtifactIdentity, TestOutcome, VisualPipeline, VisualTest};

/// One test's result inside a suite, in declaration order.
#[derive(Debug)]
pub struct SuiteEntry {
    pub identity: ArtifactIdentity,
    pub result: Result<TestOutcome, VisualError>,
}

#[derive(Debug, Default)]
pub struct SuiteSummary {
    pub entries: Vec<SuiteEntry>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub baselines_established: usize,
    pub errored: usize,
}

impl SuiteSummary {
    fn from_entries(entries: Vec<SuiteEntry>) -> Self {
        let mut summary = SuiteSummary::default();
        for entry in &entries {
            match &entry.result {
                Ok(outcome) => {
                    if outcome.passed() {
                        summary.passed += 1;
                    } else {
                        summary.failed += 1;
                    }
                    if outcome.skipped() {
                        summary.skipped += 1;
                    }
                    if outcome.baseline_established() {
                        summary.baselines_established += 1;
                    }
                }
                Err(_) => summary.errored += 1,
            }
        }
        summary.entries = entries;
        summary
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

pub struct VisualSuite {
    pipeline: Arc<VisualPipeline>,
}

impl VisualSuite {
    pub fn new(pipeline: Arc<VisualPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<VisualPipeline> {
        &self.pipeline
    }

    /// Runs every test and collects the results. A failing or erroring test never
    /// stops the others.
    pub async fn run(&self, tests: Vec<VisualTest>) -> SuiteSummary {
        let parallelism = self.pipeline.config().parallelism();
        info!(tests = tests.len(), parallelism, "running visual suite");

        let mut indexed: Vec<(usize, SuiteEntry)> = stream::iter(tests.into_iter().enumerate())
            .map(|(index, test)| {
                let pipeline = Arc::clone(&self.pipeline);
                async move {
                    let result = pipeline.run(&test).await;
                    (
                        index,
                        SuiteEntry {
                            identity: test.identity,
                            result,
                        },
                    )
                }
            })
            .buffer_unordered(parallelism)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let summary = SuiteSummary::from_entries(indexed.into_iter().map(|(_, entry)| entry).collect());
        info!(
            total = summary.total(),
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            errored = summary.errored,
            "visual suite finished"
        );
        summary
    }
}

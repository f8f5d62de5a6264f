// THEORY:
// This file is the main entry point for the `visual_regression` library crate.
// It defines the public API exposed to test harnesses and CI tooling.
//
// The primary goal is to export the `VisualPipeline` (one test) and the
// `VisualSuite` (many tests in parallel) together with their configuration and
// collaborator traits as the high-level interface of the engine. The comparison
// internals (`core_modules`) stay reachable for callers that only want a pixel
// diff or region count, but a typical consumer never needs them.

pub mod collaborators;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;

pub use collaborators::{
    Annotation, Capture, CaptureAdapter, CaptureError, EnrichmentError, EnrichmentService, ReportGenerator, Severity,
};
pub use config::VisualConfig;
pub use error::{Result, VisualError};
pub use parallel_pipeline::{SuiteSummary, VisualSuite};
pub use pipeline::{
    ArtifactIdentity, CaptureTarget, ComparisonRecord, TestOutcome, TestState, Verdict, VisualPipeline, VisualTest,
};
pub use report::SummaryReportGenerator;

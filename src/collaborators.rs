//! Seams to the outside world.
//!
//! The engine does not know how a page is rendered, how a difference is explained,
//! or how a report is laid out. It talks to those collaborators through the traits
//! here and only depends on the shapes they return.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_modules::artifact_paths::CaptureTarget;
use crate::core_modules::comparison_record::ComparisonRecord;

// ============================================================================
// Capture
// ============================================================================

/// What a capture adapter produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// PNG bytes of the rendered target.
    Raster(Vec<u8>),
    /// The target exists in the test but could not be observed (hidden, detached,
    /// never rendered).
    NotVisible,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("capture driver error: {0}")]
    Driver(String),
}

/// Produces raw screenshot bytes for a target.
#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    async fn capture(&self, target: &CaptureTarget) -> Result<Capture, CaptureError>;
}

// ============================================================================
// Enrichment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
    /// Used by fallback annotations.
    Unknown,
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Severity::Low,
            "MEDIUM" => Severity::Medium,
            "HIGH" => Severity::High,
            _ => Severity::Unknown,
        }
    }
}

/// A human-oriented explanation of a visual difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(alias = "nonTechnicalSummary")]
    pub summary: String,
    pub technical_analysis: String,
    pub what_changed: String,
    pub recommendation: String,
    pub severity: Severity,
}

impl Annotation {
    /// The deterministic stand-in used whenever enrichment fails or is unavailable.
    pub fn fallback(reason: impl Display) -> Self {
        Self {
            summary: "Automated analysis unavailable.".to_string(),
            technical_analysis: reason.to_string(),
            what_changed: "Unknown".to_string(),
            recommendation: "Manual review required.".to_string(),
            severity: Severity::Unknown,
        }
    }

    /// Explains a run that ended in an error instead of a verdict. No enrichment
    /// service is consulted: there is no diff raster to show it.
    pub fn aborted(error: impl Display) -> Self {
        Self {
            summary: "The visual test stopped before a verdict was reached.".to_string(),
            technical_analysis: error.to_string(),
            what_changed: "Unknown".to_string(),
            recommendation: "Fix the reported error and rerun the test.".to_string(),
            severity: Severity::Unknown,
        }
    }

    /// What a report shows for a record that has no annotation on disk.
    pub fn placeholder_for(record: &ComparisonRecord) -> Self {
        if let Some(error) = &record.error {
            Self::aborted(error)
        } else if record.mismatch_count == 0 {
            Self {
                summary: "No visual changes detected between baseline and actual screenshots.".to_string(),
                technical_analysis: "Pixel-by-pixel comparison shows identical images.".to_string(),
                what_changed: "No UI elements have changed.".to_string(),
                recommendation: "No action needed.".to_string(),
                severity: Severity::Low,
            }
        } else {
            Self {
                summary: "Automated analysis not available.".to_string(),
                technical_analysis: "Technical analysis was not generated.".to_string(),
                what_changed: "Change details unavailable.".to_string(),
                recommendation: "Review the diff image.".to_string(),
                severity: Severity::Unknown,
            }
        }
    }

    /// Parses a model's free-text answer. Markdown code fences are stripped first;
    /// anything that still is not an annotation becomes a fallback carrying the raw
    /// text for a human to read.
    pub fn from_model_output(text: &str) -> Self {
        let cleaned = strip_code_fences(text);
        match serde_json::from_str::<Annotation>(&cleaned) {
            Ok(annotation) => annotation,
            Err(_) => Self {
                summary: "Enrichment returned invalid JSON.".to_string(),
                technical_analysis: cleaned,
                what_changed: "Unknown".to_string(),
                recommendation: "Manual review needed.".to_string(),
                severity: Severity::Unknown,
            },
        }
    }
}

fn strip_code_fences(text: &str) -> String {
    let mut cleaned = text.to_string();
    for fence in ["```json", "```JSON", "```Json", "```"] {
        cleaned = cleaned.replace(fence, "");
    }
    cleaned.trim().to_string()
}

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("enrichment service unavailable: {0}")]
    Unavailable(String),

    #[error("enrichment service returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("enrichment service error: {0}")]
    Service(String),
}

/// Explains a failing comparison from its difference raster and record.
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn annotate(&self, diff_png: &[u8], record: &ComparisonRecord) -> Result<Annotation, EnrichmentError>;
}

// ============================================================================
// Reporting
// ============================================================================

/// Renders every persisted record into a human-readable summary.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn model_output_inside_code_fences_is_parsed() {
        let text = "```json\n{\n  \"nonTechnicalSummary\": \"Button moved\",\n  \"technicalAnalysis\": \"Login button shifted 12px\",\n  \"whatChanged\": \"Login button\",\n  \"recommendation\": \"Check the flex gap\",\n  \"severity\": \"medium\"\n}\n```";
        let annotation = Annotation::from_model_output(text);
        assert_eq!(
            annotation,
            Annotation {
                summary: "Button moved".into(),
                technical_analysis: "Login button shifted 12px".into(),
                what_changed: "Login button".into(),
                recommendation: "Check the flex gap".into(),
                severity: Severity::Medium,
            }
        );
    }

    #[test]
    fn unparseable_model_output_falls_back_with_the_raw_text() {
        let annotation = Annotation::from_model_output("  I think the header changed.  ");
        assert_eq!(annotation.severity, Severity::Unknown);
        assert_eq!(annotation.technical_analysis, "I think the header changed.");
    }

    #[test]
    fn unknown_severity_labels_degrade_to_unknown() {
        assert_eq!(Severity::from("critical".to_string()), Severity::Unknown);
        assert_eq!(Severity::from(" high ".to_string()), Severity::High);
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"HIGH\"");
        let back: Severity = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(back, Severity::Low);
    }

    #[test]
    fn aborted_records_get_an_error_placeholder() {
        use crate::core_modules::artifact_paths::ArtifactIdentity;
        let identity = ArtifactIdentity::new("home", "chromium");
        let record = ComparisonRecord::aborted(&identity, "home", 0.1, "image size mismatch");
        let placeholder = Annotation::placeholder_for(&record);
        assert_eq!(placeholder, Annotation::aborted("image size mismatch"));
        assert_eq!(placeholder.technical_analysis, "image size mismatch");
    }

    #[test]
    fn fallback_is_deterministic() {
        assert_eq!(Annotation::fallback("timeout"), Annotation::fallback("timeout"));
        assert_eq!(Annotation::fallback("timeout").technical_analysis, "timeout");
    }
}

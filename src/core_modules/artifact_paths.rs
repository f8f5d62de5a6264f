// THEORY:
// The artifact path resolver is the only place in the engine that turns an
// identity into file locations. Callers never build paths themselves, which is what
// keeps every test's artifacts in a disjoint namespace and lets independent tests
// run in parallel without locking the filesystem.
//
// Key architectural principles:
// 1.  **Deterministic Identity**: `(test, browser, region?)` maps to the same paths on
//     every run. No timestamps, no randomness, so a later run finds the baseline an
//     earlier run created.
// 2.  **Browser Partitioning**: Baselines are partitioned per browser so a Chromium
//     render is never compared against a Firefox one. An identity without a browser
//     is refused with `MissingDimension` before anything touches the disk.
// 3.  **Region Folding**: A region name is part of the identity but not a partition.
//     It is folded into the artifact file name (`<test>--<region>--<digest>`).
// 4.  **Injective Naming**: Names are sanitized to `[A-Za-z0-9._-]`, which is lossy.
//     Whenever sanitizing changed something, a region is present, or the raw name
//     already contains the `--` separator, a digest of the raw components is
//     appended after `--`. A name without a digest never contains `--`, so two
//     distinct identities can only share paths through a digest collision.
// 5.  **Ephemeral vs Durable**: Baselines are long-lived. Actual, diff, metadata and
//     annotation artifacts are recreated on every run and `prepare_run` may purge
//     them wholesale.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, VisualError};

pub const BASELINE_DIR: &str = "baseline";
pub const ACTUAL_DIR: &str = "actual";
pub const DIFF_DIR: &str = "diff";
pub const REPORTS_DIR: &str = "reports";
pub const ANNOTATIONS_DIR: &str = "ai";

const REGION_SEPARATOR: &str = "--";
const DIGEST_BYTES: usize = 8;

/// What a capture adapter is asked to photograph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    FullPage,
    /// A named sub-region (a selector, a component name, whatever the adapter understands).
    Region(String),
}

/// The composite key addressing one comparison unit's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactIdentity {
    pub test_name: String,
    pub browser_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
}

impl ArtifactIdentity {
    pub fn new(test_name: impl Into<String>, browser_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            browser_name: Some(browser_name.into()),
            region_name: None,
        }
    }

    pub fn with_region(mut self, region_name: impl Into<String>) -> Self {
        self.region_name = Some(region_name.into());
        self
    }

    /// The capture target implied by the identity.
    pub fn target(&self) -> CaptureTarget {
        match &self.region_name {
            Some(region) => CaptureTarget::Region(region.clone()),
            None => CaptureTarget::FullPage,
        }
    }

    /// The browser partition, or `MissingDimension` if absent or blank.
    pub fn browser(&self) -> Result<&str> {
        match self.browser_name.as_deref().map(str::trim) {
            Some(browser) if !browser.is_empty() => Ok(browser),
            _ => Err(VisualError::MissingDimension {
                dimension: "browserName",
            }),
        }
    }

    /// The file stem shared by every artifact of this identity.
    pub fn artifact_name(&self) -> Result<String> {
        let test_name = self.test_name.trim();
        if test_name.is_empty() {
            return Err(VisualError::MissingDimension {
                dimension: "testName",
            });
        }
        let region = self.region_name.as_deref().map(str::trim).filter(|r| !r.is_empty());

        let mut name = sanitize(test_name);
        let mut ambiguous = name != test_name || test_name.contains(REGION_SEPARATOR);
        if let Some(region) = region {
            name.push_str(REGION_SEPARATOR);
            name.push_str(&sanitize(region));
            ambiguous = true;
        }
        if ambiguous {
            name.push_str(REGION_SEPARATOR);
            name.push_str(&digest(&[test_name, region.unwrap_or_default()]));
        }
        Ok(name)
    }
}

impl std::fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.test_name)?;
        if let Some(region) = &self.region_name {
            write!(f, "#{region}")?;
        }
        write!(f, " [{}]", self.browser_name.as_deref().unwrap_or("?"))
    }
}

/// The canonical locations owned by one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// `<browser>/<artifact>`, unique per identity.
    pub key: String,
    pub artifact_name: String,
    pub browser_name: String,
    pub baseline: PathBuf,
    pub actual: PathBuf,
    pub diff: PathBuf,
    pub metadata: PathBuf,
    pub annotation: PathBuf,
}

/// Resolves identities to paths under one artifact root.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    root: PathBuf,
}

impl ArtifactResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.root.join(BASELINE_DIR)
    }

    pub fn actual_dir(&self) -> PathBuf {
        self.root.join(ACTUAL_DIR)
    }

    pub fn diff_dir(&self) -> PathBuf {
        self.root.join(DIFF_DIR)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.reports_dir().join(ANNOTATIONS_DIR)
    }

    /// Maps an identity to its four artifacts plus its enrichment annotation.
    /// Performs no I/O.
    pub fn resolve(&self, identity: &ArtifactIdentity) -> Result<ArtifactPaths> {
        let browser_name = partition_name(identity.browser()?);
        let artifact_name = identity.artifact_name()?;

        Ok(ArtifactPaths {
            key: format!("{browser_name}/{artifact_name}"),
            baseline: self
                .baseline_dir()
                .join(&browser_name)
                .join(format!("{artifact_name}.png")),
            actual: self
                .actual_dir()
                .join(&browser_name)
                .join(format!("{artifact_name}.png")),
            diff: self
                .diff_dir()
                .join(&browser_name)
                .join(format!("{artifact_name}-diff.png")),
            metadata: self
                .diff_dir()
                .join(&browser_name)
                .join(format!("{artifact_name}.json")),
            annotation: self
                .annotations_dir()
                .join(&browser_name)
                .join(format!("{artifact_name}.json")),
            artifact_name,
            browser_name,
        })
    }

    /// Purges every ephemeral artifact directory and makes sure the baseline
    /// directory exists. Baselines are never touched.
    pub async fn prepare_run(&self) -> Result<()> {
        for dir in [self.actual_dir(), self.diff_dir(), self.annotations_dir()] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => debug!(dir = %dir.display(), "purged ephemeral artifacts"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(VisualError::io(&dir, e)),
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| VisualError::io(&dir, e))?;
        }
        let baseline_dir = self.baseline_dir();
        tokio::fs::create_dir_all(&baseline_dir)
            .await
            .map_err(|e| VisualError::io(&baseline_dir, e))?;
        Ok(())
    }
}

/// Replaces anything outside `[A-Za-z0-9._-]` with `-` and refuses leading dots,
/// so a component can never climb out of its partition.
fn sanitize(component: &str) -> String {
    let mut out: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if out.starts_with('.') {
        out = out.replacen('.', "-", 1);
    }
    out
}

/// A browser partition name. Falls back to a digest suffix like `artifact_name`
/// when sanitizing would merge two distinct browsers.
fn partition_name(browser: &str) -> String {
    let mut name = sanitize(browser);
    if name != browser || browser.contains(REGION_SEPARATOR) {
        name.push_str(REGION_SEPARATOR);
        name.push_str(&digest(&[browser]));
    }
    name
}

/// First `DIGEST_BYTES` of the SHA-256 over the raw components, hex encoded.
fn digest(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for component in components {
        hasher.update(component.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..DIGEST_BYTES])
}

/// Removes a file, treating "already gone" as success.
pub(crate) async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(VisualError::io(path, e)),
    }
}

/// Writes `bytes` to `path`, creating parent directories as needed.
pub(crate) async fn write_creating_dirs(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VisualError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| VisualError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ArtifactResolver {
        ArtifactResolver::new("/runs")
    }

    #[test]
    fn resolves_the_browser_partitioned_layout() {
        let paths = resolver()
            .resolve(&ArtifactIdentity::new("login-page", "chromium"))
            .unwrap();
        assert_eq!(paths.key, "chromium/login-page");
        assert_eq!(paths.baseline, PathBuf::from("/runs/baseline/chromium/login-page.png"));
        assert_eq!(paths.actual, PathBuf::from("/runs/actual/chromium/login-page.png"));
        assert_eq!(paths.diff, PathBuf::from("/runs/diff/chromium/login-page-diff.png"));
        assert_eq!(paths.metadata, PathBuf::from("/runs/diff/chromium/login-page.json"));
        assert_eq!(
            paths.annotation,
            PathBuf::from("/runs/reports/ai/chromium/login-page.json")
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let identity = ArtifactIdentity::new("home", "webkit").with_region("header");
        assert_eq!(resolver().resolve(&identity).unwrap(), resolver().resolve(&identity).unwrap());
    }

    #[test]
    fn region_is_folded_into_the_artifact_name() {
        let paths = resolver()
            .resolve(&ArtifactIdentity::new("home", "firefox").with_region("nav bar"))
            .unwrap();
        assert!(paths.artifact_name.starts_with("home--nav-bar--"));
        assert_eq!(paths.artifact_name.len(), "home--nav-bar--".len() + 16);
        assert!(paths.baseline.starts_with("/runs/baseline/firefox"));
    }

    #[test]
    fn plain_names_are_kept_readable() {
        let paths = resolver()
            .resolve(&ArtifactIdentity::new("checkout_v2.step-1", "chromium"))
            .unwrap();
        assert_eq!(paths.artifact_name, "checkout_v2.step-1");
    }

    #[test]
    fn region_cannot_alias_a_test_name_containing_the_separator() {
        let with_region = resolver()
            .resolve(&ArtifactIdentity::new("home", "chromium").with_region("nav"))
            .unwrap();
        let lookalike = resolver()
            .resolve(&ArtifactIdentity::new("home--nav", "chromium"))
            .unwrap();
        assert_ne!(with_region.baseline, lookalike.baseline);
        assert_ne!(with_region.key, lookalike.key);
    }

    #[test]
    fn names_that_sanitize_alike_stay_distinct() {
        let spaced = resolver().resolve(&ArtifactIdentity::new("nav bar", "chromium")).unwrap();
        let slashed = resolver().resolve(&ArtifactIdentity::new("nav/bar", "chromium")).unwrap();
        let plain = resolver().resolve(&ArtifactIdentity::new("nav-bar", "chromium")).unwrap();
        assert_ne!(spaced.baseline, slashed.baseline);
        assert_ne!(spaced.baseline, plain.baseline);
        assert_ne!(slashed.baseline, plain.baseline);

        let odd_browser = resolver().resolve(&ArtifactIdentity::new("home", "my browser")).unwrap();
        let other_browser = resolver().resolve(&ArtifactIdentity::new("home", "my/browser")).unwrap();
        assert_ne!(odd_browser.baseline, other_browser.baseline);
    }

    #[test]
    fn browsers_get_disjoint_partitions() {
        let a = resolver().resolve(&ArtifactIdentity::new("home", "chromium")).unwrap();
        let b = resolver().resolve(&ArtifactIdentity::new("home", "firefox")).unwrap();
        assert_ne!(a.baseline, b.baseline);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn missing_or_blank_browser_is_refused() {
        let mut identity = ArtifactIdentity::new("home", "  ");
        assert!(matches!(
            resolver().resolve(&identity),
            Err(VisualError::MissingDimension { dimension: "browserName" })
        ));
        identity.browser_name = None;
        assert!(matches!(
            resolver().resolve(&identity),
            Err(VisualError::MissingDimension { dimension: "browserName" })
        ));
    }

    #[test]
    fn blank_test_name_is_refused() {
        assert!(matches!(
            resolver().resolve(&ArtifactIdentity::new("", "chromium")),
            Err(VisualError::MissingDimension { dimension: "testName" })
        ));
    }

    #[test]
    fn path_traversal_is_neutralised() {
        let paths = resolver()
            .resolve(&ArtifactIdentity::new("../../etc/passwd", ".."))
            .unwrap();
        assert!(paths.baseline.starts_with("/runs/baseline"));
        assert!(paths.key.starts_with("-.--"));
        assert!(paths.artifact_name.starts_with("-.-..-etc-passwd--"));
        assert!(!paths.artifact_name.contains('/'));
        assert!(paths.browser_name.starts_with("-.--"));
    }

    #[test]
    fn identity_target_follows_region() {
        assert_eq!(ArtifactIdentity::new("a", "b").target(), CaptureTarget::FullPage);
        assert_eq!(
            ArtifactIdentity::new("a", "b").with_region("footer").target(),
            CaptureTarget::Region("footer".into())
        );
    }

    #[tokio::test]
    async fn prepare_run_purges_ephemeral_artifacts_but_keeps_baselines() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(dir.path());
        let paths = resolver.resolve(&ArtifactIdentity::new("home", "chromium")).unwrap();
        for path in [&paths.baseline, &paths.actual, &paths.diff, &paths.metadata, &paths.annotation] {
            write_creating_dirs(path, b"x").await.unwrap();
        }

        resolver.prepare_run().await.unwrap();

        assert!(paths.baseline.exists());
        assert!(!paths.actual.exists());
        assert!(!paths.diff.exists());
        assert!(!paths.metadata.exists());
        assert!(!paths.annotation.exists());
        assert!(resolver.actual_dir().is_dir());
        assert!(resolver.diff_dir().is_dir());
        assert!(resolver.annotations_dir().is_dir());
    }
}

// Command-line entry point for the visual-regression engine.
//
// `compare` exits with 3 when the images differ in size and 4 when the mismatch
// percentage exceeds `--max-mismatch-percent`, so shell scripts can tell the two
// apart. Differences within the tolerance still leave a diff raster behind.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use visual_regression::config::{DEFAULT_THRESHOLD, VisualConfig};
use visual_regression::core_modules::artifact_paths::ArtifactResolver;
use visual_regression::core_modules::blob_detector::blob_detector::{self, DEFAULT_MIN_REGION_SIZE};
use visual_regression::core_modules::pixel_diff::pixel_diff::{self, DiffOptions, validate_threshold};
use visual_regression::core_modules::raster::RasterImage;
use visual_regression::error::VisualError;

const DEFAULT_MAX_MISMATCH_PERCENT: f64 = 0.5;
const EXIT_DIMENSION_MISMATCH: u8 = 3;
const EXIT_DIFFERENCES: u8 = 4;

/// Visual regression testing: baselines, pixel diffs and difference regions
#[derive(Parser)]
#[command(name = "visual_regression")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Purge actual, diff and annotation artifacts before a run (baselines are kept)
    Prepare {
        /// Configuration file path
        #[arg(short, long, default_value = "visual.toml")]
        config: PathBuf,
    },

    /// Compare two PNG files and write a diff raster
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Accepted reference image
    baseline: PathBuf,

    /// Freshly captured image
    actual: PathBuf,

    /// Where the diff raster is written
    diff: PathBuf,

    /// Per-pixel distance (0..=1) a pixel must exceed to count as a mismatch
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD, value_parser = parse_threshold)]
    threshold: f64,

    /// Smallest cluster of difference pixels that counts as a region
    #[arg(short, long, default_value_t = DEFAULT_MIN_REGION_SIZE)]
    min_region_size: usize,

    /// Mismatch percentage tolerated before the comparison fails
    #[arg(long, default_value_t = DEFAULT_MAX_MISMATCH_PERCENT, value_parser = parse_percent)]
    max_mismatch_percent: f64,
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("`{raw}` is not a number: {e}"))?;
    validate_threshold(value).map_err(|e| e.to_string())
}

fn parse_percent(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("`{raw}` is not a number: {e}"))?;
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("percentage must be within [0, 100], got {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareStatus {
    Clean,
    WithinTolerance,
    DimensionMismatch,
    Differences,
}

impl CompareStatus {
    fn exit_code(self) -> ExitCode {
        match self {
            CompareStatus::Clean | CompareStatus::WithinTolerance => ExitCode::SUCCESS,
            CompareStatus::DimensionMismatch => ExitCode::from(EXIT_DIMENSION_MISMATCH),
            CompareStatus::Differences => ExitCode::from(EXIT_DIFFERENCES),
        }
    }
}

#[derive(Debug)]
struct CompareReport {
    status: CompareStatus,
    mismatch_count: u64,
    mismatch_percent: f64,
    regions: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Prepare { config } => {
            prepare(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Compare(args) => {
            let report = compare(&args).await?;
            match report.status {
                CompareStatus::DimensionMismatch => eprintln!("Image size mismatch."),
                CompareStatus::Clean => println!("No differences. Clean."),
                status => {
                    println!("mismatched pixels: {}", report.mismatch_count);
                    println!("mismatch percent: {:.4}%", report.mismatch_percent);
                    println!("regions: {}", report.regions);
                    if status == CompareStatus::WithinTolerance {
                        println!("PASS within threshold");
                    } else {
                        println!("FAIL");
                    }
                }
            }
            Ok(report.status.exit_code())
        }
    }
}

async fn prepare(config_path: &Path) -> anyhow::Result<()> {
    let config = VisualConfig::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let resolver = ArtifactResolver::new(&config.artifact_root);
    resolver.prepare_run().await.context("preparing artifact directories")?;
    info!(root = %resolver.root().display(), "artifact directories ready");
    Ok(())
}

async fn compare(args: &CompareArgs) -> anyhow::Result<CompareReport> {
    let options = DiffOptions::new(args.threshold)?;
    let baseline = read_raster(&args.baseline).await?;
    let actual = read_raster(&args.actual).await?;

    // A diff left over from an earlier invocation must not outlive this one.
    match tokio::fs::remove_file(&args.diff).await {
        Ok(()) => debug!(path = %args.diff.display(), "removed stale diff raster"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("removing {}", args.diff.display())),
    }

    let outcome = match pixel_diff::diff(&baseline, &actual, &options) {
        Ok(outcome) => outcome,
        Err(VisualError::DimensionMismatch { .. }) => {
            return Ok(CompareReport {
                status: CompareStatus::DimensionMismatch,
                mismatch_count: 0,
                mismatch_percent: 0.0,
                regions: 0,
            });
        }
        Err(err) => return Err(err.into()),
    };

    if outcome.is_clean() {
        return Ok(CompareReport {
            status: CompareStatus::Clean,
            mismatch_count: 0,
            mismatch_percent: 0.0,
            regions: 0,
        });
    }

    if let Some(parent) = args.diff.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(&args.diff, outcome.diff_raster.to_png()?)
        .await
        .with_context(|| format!("writing diff raster to {}", args.diff.display()))?;

    let mismatch_percent = outcome.mismatch_percent();
    let status = if mismatch_percent > args.max_mismatch_percent {
        CompareStatus::Differences
    } else {
        CompareStatus::WithinTolerance
    };
    Ok(CompareReport {
        status,
        mismatch_count: outcome.mismatch_count,
        mismatch_percent,
        regions: blob_detector::count_regions(&outcome.diff_raster, args.min_region_size),
    })
}

async fn read_raster(path: &Path) -> anyhow::Result<RasterImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    RasterImage::from_png(&bytes).with_context(|| format!("decoding {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use visual_regression::core_modules::pixel::pixel::Pixel;

    const WHITE: Pixel = Pixel::new(255, 255, 255, 255);
    const BLACK: Pixel = Pixel::new(0, 0, 0, 255);

    fn write_png(dir: &Path, name: &str, image: &RasterImage) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, image.to_png().unwrap()).unwrap();
        path
    }

    /// 100x100 white with a 20x20 black block: 4% of the pixels differ.
    fn block_fixture(dir: &Path) -> (PathBuf, PathBuf) {
        let baseline = RasterImage::filled(100, 100, WHITE);
        let mut actual = baseline.clone();
        for y in 10..30 {
            for x in 10..30 {
                actual.set_pixel(x, y, BLACK);
            }
        }
        (write_png(dir, "baseline.png", &baseline), write_png(dir, "actual.png", &actual))
    }

    fn compare_args(extra: &[&str], baseline: &Path, actual: &Path, diff: &Path) -> CompareArgs {
        let mut argv = vec![
            "visual_regression".to_string(),
            "compare".to_string(),
            baseline.display().to_string(),
            actual.display().to_string(),
            diff.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Compare(args) => args,
            Commands::Prepare { .. } => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn compare_defaults_match_the_engine_defaults() {
        let args = compare_args(&[], Path::new("a.png"), Path::new("b.png"), Path::new("d.png"));
        assert_eq!(args.threshold, DEFAULT_THRESHOLD);
        assert_eq!(args.min_region_size, DEFAULT_MIN_REGION_SIZE);
        assert_eq!(args.max_mismatch_percent, 0.5);
    }

    #[test]
    fn out_of_range_threshold_is_rejected_at_parse_time() {
        let parsed = Cli::try_parse_from(["visual_regression", "compare", "a.png", "b.png", "d.png", "-t", "1.5"]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from([
            "visual_regression",
            "compare",
            "a.png",
            "b.png",
            "d.png",
            "--max-mismatch-percent",
            "-3",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn prepare_takes_a_config_path() {
        let cli = Cli::try_parse_from(["visual_regression", "prepare", "--config", "ci.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Prepare { config } if config == Path::new("ci.toml")));
    }

    #[tokio::test]
    async fn differences_above_the_tolerance_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (baseline, actual) = block_fixture(dir.path());
        let diff = dir.path().join("out/diff.png");

        let report = compare(&compare_args(&[], &baseline, &actual, &diff)).await.unwrap();

        assert_eq!(report.status, CompareStatus::Differences);
        assert_eq!(report.mismatch_count, 400);
        assert_eq!(report.mismatch_percent, 4.0);
        assert_eq!(report.regions, 1);
        assert!(diff.exists());
    }

    #[tokio::test]
    async fn differences_within_the_tolerance_pass_but_keep_the_diff() {
        let dir = tempfile::tempdir().unwrap();
        let (baseline, actual) = block_fixture(dir.path());
        let diff = dir.path().join("diff.png");

        let report = compare(&compare_args(&["--max-mismatch-percent", "5"], &baseline, &actual, &diff))
            .await
            .unwrap();

        assert_eq!(report.status, CompareStatus::WithinTolerance);
        assert_eq!(report.mismatch_count, 400);
        assert!(diff.exists());
    }

    #[tokio::test]
    async fn identical_images_are_clean_and_remove_a_stale_diff() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "same.png", &RasterImage::filled(10, 10, WHITE));
        let diff = dir.path().join("diff.png");
        std::fs::write(&diff, b"stale").unwrap();

        let report = compare(&compare_args(&[], &image, &image, &diff)).await.unwrap();

        assert_eq!(report.status, CompareStatus::Clean);
        assert!(!diff.exists());
    }

    #[tokio::test]
    async fn size_change_reports_a_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = write_png(dir.path(), "a.png", &RasterImage::filled(100, 100, WHITE));
        let actual = write_png(dir.path(), "b.png", &RasterImage::filled(100, 101, WHITE));
        let diff = dir.path().join("diff.png");

        let report = compare(&compare_args(&[], &baseline, &actual, &diff)).await.unwrap();

        assert_eq!(report.status, CompareStatus::DimensionMismatch);
        assert!(!diff.exists());
    }
}

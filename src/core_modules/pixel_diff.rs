// THEORY:
// The `pixel_diff` module is the comparison engine. It walks two equally sized
// rasters in lockstep and, for every position, asks `SmartPixel` how far apart the
// two source pixels are. Positions whose distance exceeds the threshold are painted
// in the difference color on a fresh raster and counted.
//
// Key architectural principles:
// 1.  **Structural Guard**: Rasters of different sizes are never compared. That is a
//     `DimensionMismatch`, a structural change such as a new viewport, and it is
//     raised before any pixel is read.
// 2.  **Order Independence**: Every position is judged on its own two pixels, so the
//     mismatch count does not depend on traversal order and the whole function is
//     deterministic.
// 3.  **Readable Evidence**: Untouched positions stay neutral (transparent, or a faded
//     grayscale copy of the baseline for context) so the only saturated red in the
//     output is a real difference. The clustering layer relies on that.
// 4.  **Pure and Synchronous**: No I/O, no suspension. Callers that live on an async
//     runtime move it onto a blocking thread.

pub mod pixel_diff {
    use serde::{Deserialize, Serialize};

    use crate::core_modules::pixel::pixel::{CHANNELS, Pixel, blend, rgb_to_y};
    use crate::core_modules::raster::RasterImage;
    use crate::core_modules::smart_pixel::smart_pixel::SmartPixel;
    use crate::error::{Result, VisualError};

    /// The marker painted at every mismatching position.
    pub const DIFF_COLOR: Pixel = Pixel::new(255, 0, 0, 255);

    /// Opacity of the grayscale baseline under `DiffBackdrop::Faded`.
    const FADED_ALPHA: f64 = 0.1;

    /// What non-mismatching positions look like in the difference raster.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum DiffBackdrop {
        /// Fully transparent.
        #[default]
        Transparent,
        /// A faint grayscale copy of the baseline.
        Faded,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct DiffOptions {
        /// Normalized distance (0.0..=1.0) a pixel pair must exceed to count.
        pub threshold: f64,
        pub backdrop: DiffBackdrop,
    }

    impl DiffOptions {
        pub fn new(threshold: f64) -> Result<Self> {
            Ok(Self {
                threshold: validate_threshold(threshold)?,
                backdrop: DiffBackdrop::default(),
            })
        }

        pub fn with_backdrop(mut self, backdrop: DiffBackdrop) -> Self {
            self.backdrop = backdrop;
            self
        }
    }

    /// The result of comparing two rasters.
    #[derive(Debug, Clone)]
    pub struct DiffOutcome {
        pub diff_raster: RasterImage,
        pub mismatch_count: u64,
    }

    impl DiffOutcome {
        pub fn mismatch_percent(&self) -> f64 {
            mismatch_percent(self.mismatch_count, self.diff_raster.pixel_count())
        }

        pub fn is_clean(&self) -> bool {
            self.mismatch_count == 0
        }
    }

    pub fn validate_threshold(threshold: f64) -> Result<f64> {
        if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
            Ok(threshold)
        } else {
            Err(VisualError::InvalidThreshold(threshold))
        }
    }

    /// `mismatch_count` as a percentage of `pixel_count`. An empty raster is 0%.
    pub fn mismatch_percent(mismatch_count: u64, pixel_count: usize) -> f64 {
        if pixel_count == 0 {
            return 0.0;
        }
        mismatch_count as f64 / pixel_count as f64 * 100.0
    }

    /// Compares `actual` against `baseline`, producing a difference raster and the
    /// number of positions whose distance exceeds `options.threshold`.
    pub fn diff(baseline: &RasterImage, actual: &RasterImage, options: &DiffOptions) -> Result<DiffOutcome> {
        if baseline.dimensions() != actual.dimensions() {
            return Err(VisualError::DimensionMismatch {
                baseline: baseline.dimensions(),
                actual: actual.dimensions(),
            });
        }
        let threshold = validate_threshold(options.threshold)?;

        let mut output = Vec::with_capacity(baseline.as_bytes().len());
        let mut mismatch_count = 0u64;

        let pairs = baseline
            .as_bytes()
            .chunks_exact(CHANNELS)
            .zip(actual.as_bytes().chunks_exact(CHANNELS));

        for (expected, observed) in pairs {
            let expected = Pixel::new(expected[0], expected[1], expected[2], expected[3]);
            let observed = Pixel::new(observed[0], observed[1], observed[2], observed[3]);

            let is_mismatch = expected != observed
                && SmartPixel::new(expected).normalized_distance(&SmartPixel::new(observed)) > threshold;

            let marker = if is_mismatch {
                mismatch_count += 1;
                DIFF_COLOR
            } else {
                neutral_pixel(expected, options.backdrop)
            };
            output.extend_from_slice(&marker.to_bytes());
        }

        let diff_raster = RasterImage::new(baseline.width(), baseline.height(), output)?;
        Ok(DiffOutcome {
            diff_raster,
            mismatch_count,
        })
    }

    fn neutral_pixel(baseline: Pixel, backdrop: DiffBackdrop) -> Pixel {
        match backdrop {
            DiffBackdrop::Transparent => Pixel::TRANSPARENT,
            DiffBackdrop::Faded => {
                let y = rgb_to_y(
                    baseline.red as f64,
                    baseline.green as f64,
                    baseline.blue as f64,
                );
                let gray = blend(y, FADED_ALPHA * baseline.alpha as f64 / 255.0)
                    .round()
                    .clamp(0.0, 255.0) as u8;
                Pixel::new(gray, gray, gray, 255)
            }
        }
    }
}

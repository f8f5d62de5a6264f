// THEORY:
// The `SmartPixel` module provides the comparative capability of the diff engine.
// It wraps a "dumb" `Pixel` and caches its YIQ coordinates so that a pixel can be
// measured against another one cheaply.
//
// Key architectural principles:
// 1.  **Comparative Analysis**: A `SmartPixel` is meaningless on its own; its value
//     is in `color_delta`, the weighted squared YIQ distance to another pixel.
// 2.  **Bounded Metric**: No pair of 8-bit colors produces a delta above
//     `MAX_YIQ_DELTA`, so every delta can be normalized into 0.0..=1.0 and
//     compared against a user-facing threshold in the same range.
// 3.  **Exactness at Zero**: Identical pixels short-circuit to a delta of exactly
//     0.0, so a threshold of 0 means "no difference at all".

pub mod smart_pixel {
    use crate::core_modules::pixel::pixel::Pixel;

    pub type ColorDelta = f64;

    /// Upper bound of `color_delta` over all pairs of 8-bit colors.
    pub const MAX_YIQ_DELTA: ColorDelta = 35215.0;

    const Y_WEIGHT: f64 = 0.5053;
    const I_WEIGHT: f64 = 0.299;
    const Q_WEIGHT: f64 = 0.1957;

    /// An analytical tool that wraps a `Pixel` to provide comparison methods.
    #[derive(Debug, Clone, Copy)]
    pub struct SmartPixel {
        pub pixel: Pixel,
        yiq: (f64, f64, f64),
    }

    impl SmartPixel {
        pub fn new(pixel: Pixel) -> Self {
            Self {
                yiq: pixel.yiq(),
                pixel,
            }
        }

        /// Weighted squared distance in YIQ space. Always non-negative.
        pub fn color_delta(&self, other: &SmartPixel) -> ColorDelta {
            if self.pixel == other.pixel {
                return 0.0;
            }
            let y = self.yiq.0 - other.yiq.0;
            let i = self.yiq.1 - other.yiq.1;
            let q = self.yiq.2 - other.yiq.2;
            Y_WEIGHT * y * y + I_WEIGHT * i * i + Q_WEIGHT * q * q
        }

        /// `color_delta` mapped into 0.0..=1.0, on the same scale as a diff
        /// threshold: a pair at distance `d` mismatches for every threshold below `d`.
        pub fn normalized_distance(&self, other: &SmartPixel) -> f64 {
            (self.color_delta(other) / MAX_YIQ_DELTA).sqrt().min(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::smart_pixel::*;
    use crate::core_modules::pixel::pixel::Pixel;

    fn smart(r: u8, g: u8, b: u8, a: u8) -> SmartPixel {
        SmartPixel::new(Pixel::new(r, g, b, a))
    }

    #[test]
    fn identical_pixels_have_zero_delta() {
        let a = smart(12, 200, 7, 255);
        assert_eq!(a.color_delta(&a), 0.0);
    }

    #[test]
    fn black_against_white_is_near_the_bound() {
        let black = smart(0, 0, 0, 255);
        let white = smart(255, 255, 255, 255);
        let delta = black.color_delta(&white);
        assert!(delta <= MAX_YIQ_DELTA);
        assert!(delta > 0.9 * MAX_YIQ_DELTA);
        assert!(black.normalized_distance(&white) > 0.9);
    }

    #[test]
    fn delta_is_symmetric() {
        let a = smart(255, 0, 0, 255);
        let b = smart(0, 0, 255, 128);
        assert!((a.color_delta(&b) - b.color_delta(&a)).abs() < 1e-9);
    }

    #[test]
    fn one_step_differences_register_at_zero_threshold() {
        let a = smart(100, 100, 100, 255);
        let b = smart(100, 100, 101, 255);
        assert!(a.normalized_distance(&b) > 0.0);
    }

    #[test]
    fn normalized_distance_is_ordered_like_the_delta() {
        let base = smart(128, 128, 128, 255);
        let near = smart(130, 128, 128, 255);
        let far = smart(200, 40, 10, 255);
        assert!(base.normalized_distance(&near) < base.normalized_distance(&far));
        assert_eq!(base.normalized_distance(&base), 0.0);
        assert!(base.normalized_distance(&far) <= 1.0);
    }
}

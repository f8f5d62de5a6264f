// THEORY:
// The `Pixel` module is the most fundamental unit of the diff engine. It is a
// "dumb" data container for a single RGBA pixel plus the single-pixel transforms
// the comparison layer needs: compositing over white and conversion into the YIQ
// color space. Nothing here knows about neighbors or about a second image;
// pairwise measurements live in `SmartPixel`.
//
// Key principles:
// 1) Single-pixel scope: transforms never read neighbors.
// 2) Alpha is resolved before any color math. A half-transparent pixel is
//    composited over white so that a transparent screenshot region compares the
//    way a reviewer would see it on a blank page.
// 3) YIQ separates brightness (Y) from chrominance (I, Q), which lets the pairwise
//    metric weight a brightness shift more heavily than a hue shift.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    /// A channel value after compositing, in the 0.0..=255.0 range.
    pub type BlendedChannel = f64;

    pub const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Fully transparent black, the neutral value of a difference raster.
        pub const TRANSPARENT: Pixel = Pixel::new(0, 0, 0, 0);

        /// Composites the pixel over an opaque white background.
        /// Opaque pixels pass through unchanged.
        pub fn blend_with_white(&self) -> (BlendedChannel, BlendedChannel, BlendedChannel) {
            let r = self.red as BlendedChannel;
            let g = self.green as BlendedChannel;
            let b = self.blue as BlendedChannel;
            if self.alpha == u8::MAX {
                return (r, g, b);
            }
            let a = self.alpha as BlendedChannel / 255.0;
            (blend(r, a), blend(g, a), blend(b, a))
        }

        /// The pixel in YIQ space, after compositing over white.
        pub fn yiq(&self) -> (f64, f64, f64) {
            let (r, g, b) = self.blend_with_white();
            (rgb_to_y(r, g, b), rgb_to_i(r, g, b), rgb_to_q(r, g, b))
        }

        pub fn to_bytes(self) -> [Byte; CHANNELS] {
            [self.red, self.green, self.blue, self.alpha]
        }
    }

    /// Linear interpolation of a channel towards white by `alpha` (0.0..=1.0).
    #[inline]
    pub fn blend(channel: BlendedChannel, alpha: f64) -> BlendedChannel {
        255.0 + (channel - 255.0) * alpha
    }

    #[inline]
    pub fn rgb_to_y(r: f64, g: f64, b: f64) -> f64 {
        r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
    }

    #[inline]
    pub fn rgb_to_i(r: f64, g: f64, b: f64) -> f64 {
        r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
    }

    #[inline]
    pub fn rgb_to_q(r: f64, g: f64, b: f64) -> f64 {
        r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
    }

    impl From<[Byte; CHANNELS]> for Pixel {
        fn from(bytes: [Byte; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            pixel.to_bytes()
        }
    }
}

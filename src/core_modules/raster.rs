// THEORY:
// `RasterImage` is the in-memory form of every screenshot the engine touches:
// baselines, actual captures, and the difference raster produced by a comparison.
// It is a "dumb" data container over a tightly packed RGBA8 buffer, decoded from
// and encoded to PNG, a lossless format, so a round trip through disk never
// changes a pixel.
//
// The buffer layout matches the frame buffers the rest of the engine slices:
// row-major, four bytes per pixel, byte index `(y * width + x) * 4`.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{Result, VisualError};

/// A decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wraps an existing RGBA8 buffer, validating its length.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize * CHANNELS {
            return Err(VisualError::InvalidRaster {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A raster where every pixel has the same value.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(pixel_count * CHANNELS);
        for _ in 0..pixel_count {
            pixels.extend_from_slice(&pixel.to_bytes());
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_png(bytes: &[u8]) -> Result<Self> {
        let (width, height, pixels) = image_helper::decode_png(bytes)?;
        Self::new(width, height, pixels)
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        Ok(image_helper::encode_png(self.width, self.height, &self.pixels)?)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    fn byte_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    /// The pixel at `(x, y)`. Coordinates must be inside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let i = self.byte_index(x, y);
        Pixel::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        )
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        let i = self.byte_index(x, y);
        self.pixels[i..i + CHANNELS].copy_from_slice(&pixel.to_bytes());
    }

    /// Iterates pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.pixels
            .chunks_exact(CHANNELS)
            .map(|p| Pixel::new(p[0], p[1], p[2], p[3]))
    }
}

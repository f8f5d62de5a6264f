pub mod image_helper {
    use image::{ExtendedColorType, ImageEncoder, ImageFormat};

    /// Encodes a tightly packed RGBA8 buffer as PNG.
    pub fn encode_png(width: u32, height: u32, buffer: &[u8]) -> Result<Vec<u8>, image::ImageError> {
        let mut output = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut output);
        encoder.write_image(buffer, width, height, ExtendedColorType::Rgba8)?;
        Ok(output)
    }

    /// Decodes PNG bytes into `(width, height, rgba8_buffer)`, converting any other
    /// color type to RGBA8.
    pub fn decode_png(bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), image::ImageError> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok((width, height, decoded.into_raw()))
    }
}

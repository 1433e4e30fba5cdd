use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// Length of the longer side after compression.
pub const TARGET_LONG_SIDE: u32 = 1920;

/// JPEG re-encode quality.
pub const JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Resize-and-re-encode for uploaded images.
///
/// JPEG stays JPEG (quality 80), PNG stays PNG (lossless). Every other format is
/// stored as uploaded.
#[derive(Debug, Clone, Copy)]
pub struct ImageCompressor {
    long_side: u32,
    jpeg_quality: u8,
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self {
            long_side: TARGET_LONG_SIDE,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl ImageCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize so the longer side is exactly the target length and re-encode in the
    /// original format.
    pub fn compress(&self, data: &[u8], content_type: &str) -> Result<Vec<u8>, CompressionError> {
        let format = supported_format(content_type)?;

        let img = image::load_from_memory_with_format(data, format)
            .map_err(CompressionError::Decode)?;
        let (width, height) = img.dimensions();
        let (target_w, target_h) = target_dimensions(width, height, self.long_side);

        let resized = img.resize_exact(target_w, target_h, FilterType::Lanczos3);

        let mut buffer = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel.
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality);
                DynamicImage::ImageRgb8(resized.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(CompressionError::Encode)?;
            }
            _ => {
                resized
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(CompressionError::Encode)?;
            }
        }

        tracing::debug!(
            original_width = width,
            original_height = height,
            width = target_w,
            height = target_h,
            original_bytes = data.len(),
            compressed_bytes = buffer.len(),
            "Image re-encoded"
        );

        Ok(buffer)
    }

    /// Compress, keeping the original bytes when compression fails or does not make
    /// the file strictly smaller. Never fails.
    pub fn compress_or_original(&self, data: Vec<u8>, content_type: &str) -> Vec<u8> {
        match self.compress(&data, content_type) {
            Ok(compressed) if compressed.len() < data.len() => compressed,
            Ok(compressed) => {
                tracing::debug!(
                    original_bytes = data.len(),
                    compressed_bytes = compressed.len(),
                    "Compressed image is not smaller, keeping original"
                );
                data
            }
            Err(CompressionError::UnsupportedFormat(format)) => {
                tracing::debug!(content_type = %format, "Image format not recompressed");
                data
            }
            Err(e) => {
                tracing::warn!(error = %e, "Image compression failed, keeping original");
                data
            }
        }
    }
}

/// Dimensions with the longer side set to `long_side` and the aspect ratio kept.
/// A square image becomes `long_side` x `long_side`.
pub fn target_dimensions(width: u32, height: u32, long_side: u32) -> (u32, u32) {
    let scale = |short: u32, long: u32| -> u32 {
        let scaled = (f64::from(short) * f64::from(long_side) / f64::from(long)).round();
        (scaled as u32).max(1)
    };

    if width >= height {
        (long_side, scale(height, width.max(1)))
    } else {
        (scale(width, height), long_side)
    }
}

fn supported_format(content_type: &str) -> Result<ImageFormat, CompressionError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/png" => Ok(ImageFormat::Png),
        _ => Err(CompressionError::UnsupportedFormat(essence)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    /// Detailed content so the quality-100 source is much larger than a quality-80 re-encode.
    fn noisy_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503)) >> 7;
            Rgb([(v & 0xff) as u8, ((x + y) & 0xff) as u8, ((v >> 8) & 0xff) as u8])
        })
    }

    fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        DynamicImage::ImageRgb8(img.clone())
            .write_with_encoder(encoder)
            .unwrap();
        buf
    }

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_target_dimensions_landscape() {
        assert_eq!(target_dimensions(3000, 2000, 1920), (1920, 1280));
        assert_eq!(target_dimensions(4000, 3001, 1920), (1920, 1440));
    }

    #[test]
    fn test_target_dimensions_portrait_and_square() {
        assert_eq!(target_dimensions(2000, 3000, 1920), (1280, 1920));
        assert_eq!(target_dimensions(500, 500, 1920), (1920, 1920));
    }

    #[test]
    fn test_target_dimensions_never_zero() {
        assert_eq!(target_dimensions(10_000, 1, 1920), (1920, 1));
    }

    #[test]
    fn test_large_jpeg_resized_and_smaller() {
        let original = encode_jpeg(&noisy_rgb(3000, 2000), 100);
        let compressor = ImageCompressor::new();

        let compressed = compressor.compress(&original, "image/jpeg").unwrap();
        assert!(compressed.len() < original.len());

        let decoded = image::load_from_memory_with_format(&compressed, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (1920, 1280));

        let shipped = compressor.compress_or_original(original.clone(), "image/jpeg");
        assert_eq!(shipped, compressed);
    }

    #[test]
    fn test_png_stays_png() {
        let img = RgbaImage::from_pixel(2400, 1200, Rgba([10, 20, 30, 255]));
        let original = encode_png(&img);

        let compressed = ImageCompressor::new()
            .compress(&original, "image/png")
            .unwrap();
        let format = image::guess_format(&compressed).unwrap();
        assert_eq!(format, ImageFormat::Png);

        let decoded = image::load_from_memory(&compressed).unwrap();
        assert_eq!(decoded.dimensions(), (1920, 960));
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_larger_result_keeps_original() {
        // A tiny image grows when scaled up to the target size.
        let original = encode_jpeg(&noisy_rgb(16, 16), 50);
        let shipped = ImageCompressor::new().compress_or_original(original.clone(), "image/jpeg");
        assert_eq!(shipped, original);
    }

    #[test]
    fn test_unsupported_format() {
        let result = ImageCompressor::new().compress(b"GIF89a", "image/gif");
        assert!(matches!(result, Err(CompressionError::UnsupportedFormat(_))));

        let data = b"GIF89a".to_vec();
        assert_eq!(
            ImageCompressor::new().compress_or_original(data.clone(), "image/gif"),
            data
        );
    }

    #[test]
    fn test_corrupt_jpeg_keeps_original() {
        let data = b"definitely not a jpeg".to_vec();
        assert!(matches!(
            ImageCompressor::new().compress(&data, "image/jpeg"),
            Err(CompressionError::Decode(_))
        ));
        assert_eq!(
            ImageCompressor::new().compress_or_original(data.clone(), "image/jpeg"),
            data
        );
    }
}

//! Test fixtures: encoded images.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    }))
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf.into_inner()
}

/// Quality 100, so recompression at 80 always comes out smaller.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 100))
        .expect("Failed to encode JPEG");
    buf
}

/// GIF is accepted as an image but stored as uploaded, so it activates without a resize.
pub fn create_test_gif(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(gradient(width, height).to_rgba8())
        .write_to(&mut buf, ImageFormat::Gif)
        .expect("Failed to encode GIF");
    buf.into_inner()
}

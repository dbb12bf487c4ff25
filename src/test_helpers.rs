//! Shared test utilities for the instaframe test suite.
//!
//! Synthetic image writers and template fixtures so tests never depend on
//! binary files checked into the repository.

use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};

// =========================================================================
// Synthetic images
// =========================================================================

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create an image in whatever format the path's extension names.
///
/// JPEG goes through [`create_test_jpeg`]; everything else is written as RGBA.
pub fn create_test_image(path: &Path, width: u32, height: u32) {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        return create_test_jpeg(path, width, height);
    }
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, 64, (y % 256) as u8, 255])
    });
    DynamicImage::ImageRgba8(img).save(path).unwrap();
}

/// Write a solid single-color PNG (useful as a caption mask or placeholder).
pub fn create_solid_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
    RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

// =========================================================================
// Template fixtures
// =========================================================================

/// Write a template TOML into `dir` and return its path.
pub fn write_template(dir: &Path, toml: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("template.toml");
    std::fs::write(&path, toml).unwrap();
    path
}

/// The reference template: 880x880 white canvas, photo slot at
/// `(40,40)-(840,840)`, caption block along the bottom edge.
pub const STANDARD_TEMPLATE: &str = r##"
[canvas]
width = 880
height = 880
background = "#ffffff"

[[layers]]
name = "FOTO"
kind = "pixel"
bounds = [40, 40, 840, 840]

[[layers]]
name = "TEXT"
kind = "text"
bounds = [40, 850, 840, 870]
color = "#000000"
"##;

/// Write [`STANDARD_TEMPLATE`] into `dir`.
pub fn write_standard_template(dir: &Path) -> PathBuf {
    write_template(dir, STANDARD_TEMPLATE)
}

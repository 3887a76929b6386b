use std::path::Path;

use image::{ImageReader, RgbaImage};
use imt_core::GrayImage;

/// Decode any format the `image` crate knows into RGBA
pub fn load_rgba(path: &Path) -> Result<RgbaImage, Box<dyn std::error::Error>> {
    Ok(ImageReader::open(path)?.decode()?.to_rgba8())
}

/// Compiler input for a decoded image: the plain channel mean, alpha ignored
pub fn grayscale(rgba: &RgbaImage) -> GrayImage {
    GrayImage::from_rgba8(rgba.width() as usize, rgba.height() as usize, rgba.as_raw())
}

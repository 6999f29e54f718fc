//! Internal utility functions for imageops-matting.
//!
//! This module contains common functionality used across the matting stages.

use crate::error::MattingError;
use image::{Luma, Pixel, Rgb};
use imageproc::definitions::Image;

/// Per-channel color planes of an RGB image, row-major.
pub type ColorPlanes = [Vec<f64>; 3];

/// Validates that an image has non-zero dimensions.
///
/// # Errors
///
/// `MattingError::EmptyImage` if either dimension is zero
pub const fn validate_non_empty(width: u32, height: u32) -> Result<(), MattingError> {
    if width == 0 || height == 0 {
        Err(MattingError::EmptyImage)
    } else {
        Ok(())
    }
}

/// Validates that two images have matching dimensions.
///
/// # Errors
///
/// `MattingError::DimensionMismatch` if the dimensions differ
pub fn validate_matching_dimensions(
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), MattingError> {
    if expected == actual {
        Ok(())
    } else {
        Err(MattingError::DimensionMismatch { expected, actual })
    }
}

/// Splits an RGB image into three planes scaled by `scale`.
///
/// `scale = 1.0` keeps the 0–255 range, `scale = 1.0 / 255.0` normalizes to 0–1.
pub fn color_planes(image: &Image<Rgb<u8>>, scale: f64) -> ColorPlanes {
    let pixel_count = image.width() as usize * image.height() as usize;
    let mut planes: ColorPlanes = std::array::from_fn(|_| Vec::with_capacity(pixel_count));

    for pixel in image.pixels() {
        for (plane, &value) in planes.iter_mut().zip(pixel.channels()) {
            plane.push(f64::from(value) * scale);
        }
    }

    planes
}

/// Color of the pixel at `index` as an array.
#[inline]
pub fn color_at(planes: &ColorPlanes, index: usize) -> [f64; 3] {
    [planes[0][index], planes[1][index], planes[2][index]]
}

/// Renders a unit-range field as an 8-bit grayscale image.
///
/// Values are scaled by 255, rounded and clamped to `[0, 255]`.
pub fn unit_field_to_luma8(values: &[f64], width: u32, height: u32) -> Image<Luma<u8>> {
    Image::from_fn(width, height, |x, y| {
        let value = values[y as usize * width as usize + x as usize];
        Luma([(value * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Renders a field as a floating-point grayscale image.
pub fn field_to_luma_f32(values: &[f64], width: u32, height: u32) -> Image<Luma<f32>> {
    Image::from_fn(width, height, |x, y| {
        Luma([values[y as usize * width as usize + x as usize] as f32])
    })
}

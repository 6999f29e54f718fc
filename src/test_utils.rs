//! Test utilities for imageops-matting
//!
//! Shared fixtures for the unit tests. Only compiled when running tests.

use crate::matting::trimap::TrimapMasks;
use image::Rgb;
use imageproc::definitions::Image;

/// Side of the square scenario image
pub const SCENARIO_SIZE: u32 = 100;

/// Creates a test RGB image with predefined pixel values for testing.
///
/// This function creates a 2x2 test image with known pixel values:
/// - (0,0): [200, 150, 100]
/// - (1,0): [100, 200, 150]
/// - (0,1): [150, 100, 200]
/// - (1,1): [50, 75, 25]
pub fn create_test_rgb_image() -> Image<Rgb<u8>> {
    let mut image: Image<Rgb<u8>> = Image::new(2, 2);
    image.put_pixel(0, 0, Rgb([200, 150, 100]));
    image.put_pixel(1, 0, Rgb([100, 200, 150]));
    image.put_pixel(0, 1, Rgb([150, 100, 200]));
    image.put_pixel(1, 1, Rgb([50, 75, 25]));
    image
}

/// Chebyshev distance of `(x, y)` outside the square `[low, high)`
fn distance_outside(x: u32, y: u32, low: u32, high: u32) -> u32 {
    let axis = |v: u32| {
        if v < low {
            low - v
        } else if v >= high {
            v + 1 - high
        } else {
            0
        }
    };
    axis(x).max(axis(y))
}

/// Creates the 100×100 square scenario
///
/// A white 40×40 center square is foreground and everything outside the
/// centered 60×60 square is black background. The 10-pixel band between them
/// is unknown and fades linearly from white to black.
pub fn create_scenario() -> (Image<Rgb<u8>>, TrimapMasks) {
    let image = Image::from_fn(SCENARIO_SIZE, SCENARIO_SIZE, |x, y| {
        let d = distance_outside(x, y, 30, 70);
        let value = if d == 0 {
            255
        } else if d > 10 {
            0
        } else {
            (255 * (11 - d) / 11) as u8
        };
        Rgb([value; 3])
    });

    let (foreground, background): (Vec<bool>, Vec<bool>) = image
        .enumerate_pixels()
        .map(|(x, y, _)| {
            (
                distance_outside(x, y, 30, 70) == 0,
                distance_outside(x, y, 20, 80) > 0,
            )
        })
        .unzip();

    let masks = TrimapMasks::new(SCENARIO_SIZE, SCENARIO_SIZE, foreground, background)
        .expect("scenario masks are disjoint");
    (image, masks)
}

/// Creates a 9×3 image whose left column is foreground and right column is
/// background, painted in the given gray levels; the middle is mid-gray and
/// unknown.
pub fn create_two_tone_row(foreground: u8, background: u8) -> (Image<Rgb<u8>>, TrimapMasks) {
    let (width, height) = (9, 3);
    let image = Image::from_fn(width, height, |x, _| match x {
        0 => Rgb([foreground; 3]),
        8 => Rgb([background; 3]),
        _ => Rgb([60, 90, 200]),
    });

    let (foreground, background): (Vec<bool>, Vec<bool>) =
        (0..width * height).map(|i| (i % width == 0, i % width == 8)).unzip();
    let masks =
        TrimapMasks::new(width, height, foreground, background).expect("columns are disjoint");
    (image, masks)
}

use crate::utils::{field_to_luma_f32, unit_field_to_luma8};
use image::Luma;
use imageproc::definitions::Image;
use itertools::izip;

/// Lower bound of every confidence value
pub const MIN_CONFIDENCE: f64 = 0.1;

/// Immutable snapshot of the matte between refinement iterations
///
/// Holds one alpha value in `[0, 1]` and one confidence value in
/// `[MIN_CONFIDENCE, 1]` per pixel. Each iteration consumes a snapshot by
/// reference and produces a new one; nothing is updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct MatteState {
    width: u32,
    height: u32,
    alpha: Vec<f64>,
    confidence: Vec<f64>,
}

impl MatteState {
    pub(crate) fn new(width: u32, height: u32, alpha: Vec<f64>, confidence: Vec<f64>) -> Self {
        debug_assert_eq!(alpha.len(), width as usize * height as usize);
        debug_assert_eq!(alpha.len(), confidence.len());
        Self {
            width,
            height,
            alpha,
            confidence,
        }
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    #[must_use]
    pub fn confidence(&self) -> &[f64] {
        &self.confidence
    }

    /// Alpha of pixel `(x, y)`
    #[must_use]
    pub fn alpha_at(&self, x: u32, y: u32) -> f64 {
        self.alpha[y as usize * self.width as usize + x as usize]
    }

    /// Confidence of pixel `(x, y)`
    #[must_use]
    pub fn confidence_at(&self, x: u32, y: u32) -> f64 {
        self.confidence[y as usize * self.width as usize + x as usize]
    }

    /// Largest absolute per-pixel alpha difference to `other`
    #[must_use]
    pub fn max_alpha_delta(&self, other: &Self) -> f64 {
        izip!(&self.alpha, &other.alpha)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    #[must_use]
    pub fn mean_confidence(&self) -> f64 {
        self.confidence.iter().sum::<f64>() / self.confidence.len() as f64
    }

    /// 8-bit matte, alpha scaled by 255
    #[must_use]
    pub fn alpha_image(&self) -> Image<Luma<u8>> {
        unit_field_to_luma8(&self.alpha, self.width, self.height)
    }

    /// 8-bit rendering of the confidence field
    #[must_use]
    pub fn confidence_image(&self) -> Image<Luma<u8>> {
        unit_field_to_luma8(&self.confidence, self.width, self.height)
    }

    /// Floating-point matte in `[0, 1]`
    #[must_use]
    pub fn alpha_image_f32(&self) -> Image<Luma<f32>> {
        field_to_luma_f32(&self.alpha, self.width, self.height)
    }
}

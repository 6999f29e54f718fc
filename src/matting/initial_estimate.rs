//! Initial alpha and confidence from the nearest known colors.
//!
//! Each unknown pixel is explained as a mix of the color `F` of its nearest
//! foreground pixel and the color `B` of its nearest background pixel:
//!
//! ```text
//! alpha      = clamp(Σ (C − B)(F − B) / Σ (F − B)², 0, 1)
//! residual   = Σ (C − (alpha·F + (1 − alpha)·B))²
//! confidence = max(exp(−residual / (2·VAR)), MIN_CONFIDENCE)
//! ```
//!
//! Colors are on the 0–255 scale; `VAR` is tuned for that range.

use crate::matting::boundary_distance::BoundaryMap;
use crate::matting::state::{MatteState, MIN_CONFIDENCE};
use crate::matting::trimap::TrimapMasks;
use crate::utils::{color_at, ColorPlanes};

/// Variance of the color residual in 0–255 units
pub const COLOR_RESIDUAL_VARIANCE: f64 = 100.0;

/// Alpha used when `F` and `B` are too close to separate
pub const DEGENERATE_ALPHA: f64 = 0.5;

const SEPARATION_EPSILON: f64 = 1e-6;

/// Projects `color` onto the segment from `background` to `foreground`
///
/// Returns [`DEGENERATE_ALPHA`] when the two boundary colors are nearly equal.
#[must_use]
pub fn mixing_alpha(color: [f64; 3], foreground: [f64; 3], background: [f64; 3]) -> f64 {
    let (numerator, denominator) = (0..3).fold((0.0, 0.0), |(num, den), c| {
        let separation = foreground[c] - background[c];
        (
            (color[c] - background[c]).mul_add(separation, num),
            separation.mul_add(separation, den),
        )
    });

    if denominator.abs() > SEPARATION_EPSILON {
        (numerator / denominator).clamp(0.0, 1.0)
    } else {
        DEGENERATE_ALPHA
    }
}

/// Confidence of a two-color explanation of `color` at `alpha`
#[must_use]
pub fn mixing_confidence(
    color: [f64; 3],
    foreground: [f64; 3],
    background: [f64; 3],
    alpha: f64,
) -> f64 {
    let residual: f64 = (0..3)
        .map(|c| {
            let mixed = alpha.mul_add(foreground[c], (1.0 - alpha) * background[c]);
            (color[c] - mixed).powi(2)
        })
        .sum();

    (-residual / (2.0 * COLOR_RESIDUAL_VARIANCE))
        .exp()
        .max(MIN_CONFIDENCE)
}

/// Builds the initial matte
///
/// Known pixels take their hard constraint; unknown pixels are estimated from
/// their nearest boundary colors. `colors` must be on the 0–255 scale.
///
/// The boundary maps are only read for unknown pixels, so either may be `None`
/// when the trimap has no unknown pixels.
#[must_use]
pub fn estimate_initial_matte(
    colors: &ColorPlanes,
    masks: &TrimapMasks,
    foreground_map: Option<&BoundaryMap>,
    background_map: Option<&BoundaryMap>,
) -> MatteState {
    let (width, height) = masks.dimensions();
    let (alpha, confidence): (Vec<f64>, Vec<f64>) = (0..masks.pixel_count())
        .map(|pixel| {
            if let Some(constraint) = masks.constraint(pixel) {
                return constraint;
            }
            match (foreground_map, background_map) {
                (Some(fg_map), Some(bg_map)) => {
                    let color = color_at(colors, pixel);
                    let foreground = color_at(colors, fg_map.nearest_at(pixel));
                    let background = color_at(colors, bg_map.nearest_at(pixel));
                    let alpha = mixing_alpha(color, foreground, background);
                    (
                        alpha,
                        mixing_confidence(color, foreground, background, alpha),
                    )
                }
                _ => (DEGENERATE_ALPHA, MIN_CONFIDENCE),
            }
        })
        .unzip();

    MatteState::new(width, height, alpha, confidence)
}

//! Multi-scale fusion and confidence update.
//!
//! Every window scale proposes a candidate alpha per pixel from its averaged
//! local linear model. The candidates are blended with weights
//! `weight_s · c_s[p]`, where `c_s` is that scale's smoothed confidence:
//!
//! ```text
//! alpha[p]      = Σ w_s c_s[p] candidate_s[p] / Σ w_s c_s[p]
//! confidence[p] = max(Σ w_s c_s[p]² / Σ w_s c_s[p], MIN_CONFIDENCE)
//! ```
//!
//! Known pixels are then forced back to their hard constraint.

use crate::matting::local_linear::LocalLinearModel;
use crate::matting::state::{MatteState, MIN_CONFIDENCE};
use crate::matting::trimap::TrimapMasks;
use crate::utils::{color_at, ColorPlanes};

/// Output of one window scale in one iteration
#[derive(Debug, Clone)]
pub struct ScaleContribution {
    /// Weight of the scale's window descriptor
    pub weight: f64,
    /// Window-averaged linear model per pixel
    pub models: Vec<LocalLinearModel>,
    /// Smoothed confidence per pixel, in `[0, 1]`
    pub window_confidence: Vec<f64>,
}

impl ScaleContribution {
    /// Candidate alpha of pixel `index`, clamped to `[0, 1]`
    #[inline]
    #[must_use]
    pub fn candidate(&self, colors: &ColorPlanes, index: usize) -> f64 {
        self.models[index]
            .predict(color_at(colors, index))
            .clamp(0.0, 1.0)
    }
}

/// Fused matte plus bookkeeping for diagnostics
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub state: MatteState,
    /// Unknown pixels for which no scale carried any confidence; they keep
    /// their previous alpha and confidence
    pub unresolved: usize,
}

/// Blends all scale contributions into the next matte
///
/// `colors` are the normalized (0–1) image planes the models were fitted on.
/// A pixel whose total weighted confidence is zero keeps its values from
/// `previous`, so the result is a deterministic function of its inputs.
#[must_use]
pub fn fuse(
    contributions: &[ScaleContribution],
    colors: &ColorPlanes,
    previous: &MatteState,
    masks: &TrimapMasks,
) -> FusionOutcome {
    let (width, height) = previous.dimensions();
    let pixel_count = previous.alpha().len();
    let mut alpha = Vec::with_capacity(pixel_count);
    let mut confidence = Vec::with_capacity(pixel_count);
    let mut unresolved = 0;

    for pixel in 0..pixel_count {
        let (mut value_sum, mut confidence_sum, mut confidence_sq_sum) = (0.0, 0.0, 0.0);
        for scale in contributions {
            let weighted = scale.weight * scale.window_confidence[pixel];
            value_sum = weighted.mul_add(scale.candidate(colors, pixel), value_sum);
            confidence_sum += weighted;
            confidence_sq_sum = weighted.mul_add(scale.window_confidence[pixel], confidence_sq_sum);
        }

        if confidence_sum > 0.0 {
            alpha.push((value_sum / confidence_sum).clamp(0.0, 1.0));
            confidence.push((confidence_sq_sum / confidence_sum).clamp(MIN_CONFIDENCE, 1.0));
        } else {
            if masks.constraint(pixel).is_none() {
                unresolved += 1;
            }
            alpha.push(previous.alpha()[pixel]);
            confidence.push(previous.confidence()[pixel]);
        }
    }

    apply_constraints(masks, &mut alpha, &mut confidence);

    FusionOutcome {
        state: MatteState::new(width, height, alpha, confidence),
        unresolved,
    }
}

/// Forces known pixels to `(1, 1)` for foreground and `(0, 1)` for background
pub fn apply_constraints(masks: &TrimapMasks, alpha: &mut [f64], confidence: &mut [f64]) {
    for (pixel, (a, c)) in alpha.iter_mut().zip(confidence.iter_mut()).enumerate() {
        if let Some((fixed_alpha, fixed_confidence)) = masks.constraint(pixel) {
            *a = fixed_alpha;
            *c = fixed_confidence;
        }
    }
}

//! Per-window ridge regression of alpha on color.
//!
//! Within a small neighborhood alpha is modelled as an affine function of the
//! three color channels, `alpha ≈ a·color + b`. The fit is closed form:
//!
//! ```text
//! a = (Σ + εI)⁻¹ · cov(color, alpha)
//! b = mean(alpha) − a·mean(color)
//! ```
//!
//! where Σ is the local 3×3 color covariance. The ridge term ε keeps the system
//! invertible for every window, so there is no failure path.

/// Symmetric 3×3 matrix stored as its six unique entries
///
/// Layout: `[rr, rg, rb, gg, gb, bb]`, the same ordering the color covariance
/// maps use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricMatrix3(pub [f64; 6]);

impl SymmetricMatrix3 {
    #[must_use]
    pub const fn new(rr: f64, rg: f64, rb: f64, gg: f64, gb: f64, bb: f64) -> Self {
        Self([rr, rg, rb, gg, gb, bb])
    }

    /// Returns `self + epsilon·I`
    #[must_use]
    pub fn with_ridge(self, epsilon: f64) -> Self {
        let [rr, rg, rb, gg, gb, bb] = self.0;
        Self([rr + epsilon, rg, rb, gg + epsilon, gb, bb + epsilon])
    }

    #[must_use]
    pub fn determinant(&self) -> f64 {
        let [rr, rg, rb, gg, gb, bb] = self.0;
        rb.mul_add(
            rg.mul_add(gb, -(gg * rb)),
            rr.mul_add(
                gg.mul_add(bb, -(gb * gb)),
                -(rg * rg.mul_add(bb, -(rb * gb))),
            ),
        )
    }

    /// Inverse by cofactor expansion
    ///
    /// Returns `None` when the determinant is zero or not finite.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        let [rr, rg, rb, gg, gb, bb] = self.0;
        let inv_det = 1.0 / det;
        Some(Self([
            gg.mul_add(bb, -(gb * gb)) * inv_det,
            rb.mul_add(gb, -(rg * bb)) * inv_det,
            rg.mul_add(gb, -(gg * rb)) * inv_det,
            rr.mul_add(bb, -(rb * rb)) * inv_det,
            rb.mul_add(rg, -(rr * gb)) * inv_det,
            rr.mul_add(gg, -(rg * rg)) * inv_det,
        ]))
    }

    #[must_use]
    pub fn mul_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let [rr, rg, rb, gg, gb, bb] = self.0;
        [
            rb.mul_add(v[2], rr.mul_add(v[0], rg * v[1])),
            gb.mul_add(v[2], rg.mul_add(v[0], gg * v[1])),
            bb.mul_add(v[2], rb.mul_add(v[0], gb * v[1])),
        ]
    }
}

/// Affine color-to-alpha model of one window: `alpha ≈ a·color + b`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalLinearModel {
    pub a: [f64; 3],
    pub b: f64,
}

impl LocalLinearModel {
    /// Model that predicts `value` regardless of color
    #[must_use]
    pub const fn constant(value: f64) -> Self {
        Self {
            a: [0.0; 3],
            b: value,
        }
    }

    /// Evaluates `a·color + b` without clamping
    #[inline]
    #[must_use]
    pub fn predict(&self, color: [f64; 3]) -> f64 {
        self.a[2].mul_add(
            color[2],
            self.a[1].mul_add(color[1], self.a[0].mul_add(color[0], self.b)),
        )
    }

    /// Euclidean norm of the slope vector
    #[must_use]
    pub fn slope_norm(&self) -> f64 {
        self.a.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

/// Fits the ridge-regularized local linear model of one window
///
/// # Arguments
///
/// * `mean_color` - Window mean of each color channel
/// * `mean_alpha` - Window mean of alpha
/// * `color_covariance` - Window color covariance (without ridge)
/// * `color_alpha_covariance` - Covariance of each channel with alpha
/// * `epsilon` - Ridge strength, must be positive
///
/// If rounding leaves the regularized matrix non-invertible the fit degrades
/// to the constant model `b = mean_alpha`.
#[must_use]
pub fn fit_local_linear_model(
    mean_color: [f64; 3],
    mean_alpha: f64,
    color_covariance: SymmetricMatrix3,
    color_alpha_covariance: [f64; 3],
    epsilon: f64,
) -> LocalLinearModel {
    let Some(inverse) = color_covariance.with_ridge(epsilon).inverse() else {
        return LocalLinearModel::constant(mean_alpha);
    };

    let a = inverse.mul_vector(color_alpha_covariance);
    if a.iter().any(|v| !v.is_finite()) {
        return LocalLinearModel::constant(mean_alpha);
    }

    let b = a[2].mul_add(
        -mean_color[2],
        a[1].mul_add(-mean_color[1], a[0].mul_add(-mean_color[0], mean_alpha)),
    );

    LocalLinearModel { a, b }
}

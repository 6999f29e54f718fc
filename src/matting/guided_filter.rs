//! Color-guided edge-preserving smoothing.
//!
//! Guided filter of He et al. with a three-channel guide: per window the target
//! is regressed on the guide colors, the coefficients are box-averaged, and the
//! output is `ā·I + b̄`. The refiner uses it to spread confidence along, but not
//! across, color edges.

use crate::error::GuidedFilterError;
use crate::matting::local_linear::{fit_local_linear_model, SymmetricMatrix3};
use crate::matting::windowed_statistics::box_mean;
use crate::utils::{color_at, ColorPlanes};
use itertools::izip;

/// Edge-preserving smoothing of a scalar field guided by a color image
///
/// The guide, radius and epsilon stay fixed for a whole refinement, so the
/// refiner calls [`ConfidenceSmoother::prepare`] once per window scale and
/// then applies the prepared filter to the confidence field of every
/// iteration.
pub trait ConfidenceSmoother {
    /// Precomputes everything that depends only on the guide
    ///
    /// # Errors
    ///
    /// Implementation-specific parameter validation failures.
    fn prepare<'a>(
        &self,
        guide: &'a ColorPlanes,
        width: u32,
        height: u32,
        radius: u32,
        epsilon: f64,
    ) -> Result<Box<dyn PreparedSmoother + 'a>, GuidedFilterError>;

    /// Smooths `target` using `guide` in one go
    ///
    /// # Errors
    ///
    /// Any error of [`ConfidenceSmoother::prepare`] or
    /// [`PreparedSmoother::apply`].
    fn smooth(
        &self,
        guide: &ColorPlanes,
        target: &[f64],
        width: u32,
        height: u32,
        radius: u32,
        epsilon: f64,
    ) -> Result<Vec<f64>, GuidedFilterError> {
        self.prepare(guide, width, height, radius, epsilon)?
            .apply(target)
    }
}

/// Smoothing filter bound to one guide, radius and epsilon
///
/// Window scales may be processed in parallel, hence the `Send + Sync` bound.
pub trait PreparedSmoother: Send + Sync {
    /// Smooths `target`, returning a field of the same length
    ///
    /// # Errors
    ///
    /// `GuidedFilterError::DimensionMismatch` if `target` does not have one
    /// value per guide pixel.
    fn apply(&self, target: &[f64]) -> Result<Vec<f64>, GuidedFilterError>;
}

/// Default [`ConfidenceSmoother`]: the color-guided filter
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidedFilter;

impl ConfidenceSmoother for GuidedFilter {
    fn prepare<'a>(
        &self,
        guide: &'a ColorPlanes,
        width: u32,
        height: u32,
        radius: u32,
        epsilon: f64,
    ) -> Result<Box<dyn PreparedSmoother + 'a>, GuidedFilterError> {
        validate_guided_filter_params(radius, epsilon)?;
        let pixel_count = width as usize * height as usize;
        if guide.iter().any(|plane| plane.len() != pixel_count) {
            return Err(GuidedFilterError::DimensionMismatch {
                guidance_dims: (guide[0].len() as u32, 1),
                input_dims: (width, height),
            });
        }

        Ok(Box::new(GuidedFilterColor::new(
            guide, width, height, radius, epsilon,
        )))
    }
}

fn validate_guided_filter_params(radius: u32, epsilon: f64) -> Result<(), GuidedFilterError> {
    if radius == 0 {
        return Err(GuidedFilterError::InvalidRadius { radius });
    }
    if !(epsilon > 0.0 && epsilon.is_finite()) {
        return Err(GuidedFilterError::InvalidEpsilon { epsilon });
    }
    Ok(())
}

/// Guide-dependent part of the color guided filter
///
/// Window means and covariances of the guide are computed once and reused for
/// every target filtered with the same guide, radius and epsilon.
pub struct GuidedFilterColor<'a> {
    guide: &'a ColorPlanes,
    width: u32,
    height: u32,
    radius: u32,
    epsilon: f64,
    guide_mean: [Vec<f64>; 3],
    // [rr, rg, rb, gg, gb, bb]
    guide_cov: [Vec<f64>; 6],
}

impl<'a> GuidedFilterColor<'a> {
    #[must_use]
    pub fn new(guide: &'a ColorPlanes, width: u32, height: u32, radius: u32, epsilon: f64) -> Self {
        let mean = |field: &[f64]| box_mean(field, width, height, radius);
        let guide_mean: [Vec<f64>; 3] = std::array::from_fn(|c| mean(&guide[c]));

        const PAIRS: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];
        let guide_cov: [Vec<f64>; 6] = std::array::from_fn(|k| {
            let (i, j) = PAIRS[k];
            let product: Vec<f64> = izip!(&guide[i], &guide[j]).map(|(a, b)| a * b).collect();
            izip!(mean(&product), &guide_mean[i], &guide_mean[j])
                .map(|(xy, mx, my)| mx.mul_add(-my, xy))
                .collect()
        });

        Self {
            guide,
            width,
            height,
            radius,
            epsilon,
            guide_mean,
            guide_cov,
        }
    }

    /// Filters `input`, which must have one value per guide pixel
    #[must_use]
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mean = |field: &[f64]| box_mean(field, self.width, self.height, self.radius);
        let input_mean = mean(input);

        // E[I_c * p]
        let cross_mean: [Vec<f64>; 3] = std::array::from_fn(|c| {
            let product: Vec<f64> = izip!(input, &self.guide[c]).map(|(p, g)| p * g).collect();
            mean(&product)
        });

        let pixel_count = input.len();
        let mut a: [Vec<f64>; 3] = std::array::from_fn(|_| Vec::with_capacity(pixel_count));
        let mut b = Vec::with_capacity(pixel_count);

        for i in 0..pixel_count {
            let mean_color = color_at(&self.guide_mean, i);
            let cross = std::array::from_fn(|c| {
                mean_color[c].mul_add(-input_mean[i], cross_mean[c][i])
            });
            let cov = SymmetricMatrix3(std::array::from_fn(|k| self.guide_cov[k][i]));

            let model = fit_local_linear_model(mean_color, input_mean[i], cov, cross, self.epsilon);
            for (plane, slope) in a.iter_mut().zip(model.a) {
                plane.push(slope);
            }
            b.push(model.b);
        }

        let a_mean: [Vec<f64>; 3] = std::array::from_fn(|c| mean(&a[c]));
        let b_mean = mean(&b);

        (0..pixel_count)
            .map(|i| {
                let color = color_at(self.guide, i);
                a_mean[2][i].mul_add(
                    color[2],
                    a_mean[1][i].mul_add(color[1], a_mean[0][i].mul_add(color[0], b_mean[i])),
                )
            })
            .collect()
    }
}

impl PreparedSmoother for GuidedFilterColor<'_> {
    fn apply(&self, target: &[f64]) -> Result<Vec<f64>, GuidedFilterError> {
        let pixel_count = self.width as usize * self.height as usize;
        if target.len() != pixel_count {
            return Err(GuidedFilterError::DimensionMismatch {
                guidance_dims: (self.width, self.height),
                input_dims: (target.len() as u32, 1),
            });
        }
        Ok(self.filter(target))
    }
}

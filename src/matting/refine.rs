//! Confidence-weighted multi-scale refinement loop.
//!
//! The refiner builds an initial matte from the nearest known colors and then
//! runs a fixed number of passes. In every pass each window scale
//!
//! 1. fits a ridge-regularized local linear model `alpha ≈ a·color + b` per
//!    window, weighting every pixel by its current confidence,
//! 2. averages the models over the window,
//! 3. smooths the confidence field with the image as guide,
//!
//! and the per-scale reconstructions are fused into the next matte, each
//! weighted by its smoothed confidence. Known pixels keep their hard constraint
//! throughout.
//!
//! ## Usage
//!
//! ```rust
//! use imageops_matting::{refine_alpha, RefineConfig, TrimapMasks, TrimapThresholds};
//! use imageproc::definitions::Image;
//! use image::{Luma, Rgb};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let image: Image<Rgb<u8>> = Image::from_fn(32, 32, |x, _| Rgb([(x * 8) as u8; 3]));
//! let trimap: Image<Luma<u8>> = Image::from_fn(32, 32, |x, _| match x {
//!     0..=7 => Luma([0]),
//!     24.. => Luma([255]),
//!     _ => Luma([128]),
//! });
//!
//! let masks = TrimapMasks::from_trimap(&trimap, TrimapThresholds::default())?;
//! let matte = refine_alpha(&image, &masks, &RefineConfig::default())?;
//! let alpha = matte.alpha_image();
//! # Ok(())
//! # }
//! ```

use crate::error::MattingError;
use crate::matting::boundary_distance::{BoundaryDistance, BoundaryMap, SequentialEuclidean};
use crate::matting::fusion::{fuse, ScaleContribution};
use crate::matting::guided_filter::{ConfidenceSmoother, GuidedFilter, PreparedSmoother};
use crate::matting::initial_estimate::estimate_initial_matte;
use crate::matting::local_linear::{fit_local_linear_model, LocalLinearModel, SymmetricMatrix3};
use crate::matting::state::MatteState;
use crate::matting::trimap::{Region, TrimapMasks, TrimapThresholds};
use crate::matting::windowed_statistics::{box_mean, windowed_mean_and_covariance};
use crate::utils::{color_planes, validate_matching_dimensions, validate_non_empty, ColorPlanes};
use image::{Luma, Rgb};
use imageproc::definitions::Image;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Iteration count used by [`RefineConfig::default`]
pub const DEFAULT_ITERATIONS: usize = 10;

/// One window configuration of the multi-scale pass
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WindowScale {
    /// Half-width of the square window; the window side is `2 * radius + 1`
    pub radius: u32,
    /// Ridge strength of the local regression and of the confidence smoothing
    pub epsilon: f64,
    /// Relative weight of this scale in the fusion
    pub weight: f64,
}

impl Default for WindowScale {
    fn default() -> Self {
        Self {
            radius: 3,
            epsilon: 1e-5,
            weight: 1.0,
        }
    }
}

impl WindowScale {
    #[must_use]
    pub const fn new(radius: u32, epsilon: f64, weight: f64) -> Self {
        Self {
            radius,
            epsilon,
            weight,
        }
    }

    /// Side length of the square window
    #[must_use]
    pub const fn window_size(&self) -> u32 {
        2 * self.radius + 1
    }

    /// Doubling-radius scale sequence
    ///
    /// Yields radii `first_radius, 2·first_radius, 4·first_radius, …` strictly
    /// below `max_radius`, all with the same `epsilon` and unit weight. A
    /// common choice of `max_radius` is half the image width.
    ///
    /// Returns an empty list when `first_radius` is zero or not below
    /// `max_radius`; [`RefineConfig::validate`] rejects such a config.
    #[must_use]
    pub fn pyramid(first_radius: u32, max_radius: u32, epsilon: f64) -> Vec<Self> {
        if first_radius == 0 {
            return Vec::new();
        }
        std::iter::successors(Some(first_radius), |r| r.checked_mul(2))
            .take_while(|&r| r < max_radius)
            .map(|radius| Self::new(radius, epsilon, 1.0))
            .collect()
    }

    fn validate(&self, index: usize) -> Result<(), MattingError> {
        let invalid = |reason: String| MattingError::InvalidScale { index, reason };

        if self.radius == 0 {
            return Err(invalid("radius must be at least 1".to_string()));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(invalid(format!(
                "epsilon must be positive and finite, got {}",
                self.epsilon
            )));
        }
        if !(self.weight > 0.0 && self.weight.is_finite()) {
            return Err(invalid(format!(
                "weight must be positive and finite, got {}",
                self.weight
            )));
        }
        Ok(())
    }
}

/// Parameters of the refinement
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RefineConfig {
    /// Window scales processed in every iteration
    pub scales: Vec<WindowScale>,
    /// Number of refinement passes after the initial estimate
    pub iterations: usize,
    /// Stops early once an iteration changes no alpha value by this much or
    /// more; `None` always runs all iterations
    pub convergence_threshold: Option<f64>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            scales: vec![WindowScale::default()],
            iterations: DEFAULT_ITERATIONS,
            convergence_threshold: None,
        }
    }
}

impl RefineConfig {
    #[must_use]
    pub fn with_scales(mut self, scales: Vec<WindowScale>) -> Self {
        self.scales = scales;
        self
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = Some(threshold);
        self
    }

    /// Checks every scale and the stopping criterion
    ///
    /// # Errors
    ///
    /// * `MattingError::InvalidParameter` - if there are no scales or the
    ///   convergence threshold is negative or not finite
    /// * `MattingError::InvalidScale` - if a scale has radius 0, or a
    ///   non-positive or non-finite epsilon or weight
    pub fn validate(&self) -> Result<(), MattingError> {
        if self.scales.is_empty() {
            return Err(MattingError::InvalidParameter(
                "at least one window scale is required".to_string(),
            ));
        }
        for (index, scale) in self.scales.iter().enumerate() {
            scale.validate(index)?;
        }
        if let Some(threshold) = self.convergence_threshold {
            if !(threshold >= 0.0 && threshold.is_finite()) {
                return Err(MattingError::InvalidParameter(format!(
                    "convergence threshold must be non-negative and finite, got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

/// Receives read-only snapshots while the refiner runs
///
/// Callbacks run synchronously on the calling thread between iterations.
pub trait RefinementObserver {
    /// Called once with the initial estimate
    fn on_initial_estimate(&mut self, _state: &MatteState) {}

    /// Called after iteration `iteration` (1-based) has been fused
    fn on_iteration(&mut self, _iteration: usize, _state: &MatteState) {}
}

impl RefinementObserver for () {}

/// Configured refinement pipeline
///
/// The smoothing filter and the boundary-distance service are replaceable;
/// the defaults are [`GuidedFilter`] and [`SequentialEuclidean`].
#[derive(Debug, Clone)]
pub struct AlphaRefiner<S = GuidedFilter, D = SequentialEuclidean> {
    config: RefineConfig,
    smoother: S,
    boundary: D,
    cancel: Option<Arc<AtomicBool>>,
}

impl AlphaRefiner {
    /// Creates a refiner with the default collaborators
    ///
    /// # Errors
    ///
    /// Any error of [`RefineConfig::validate`].
    pub fn new(config: RefineConfig) -> Result<Self, MattingError> {
        config.validate()?;
        Ok(Self {
            config,
            smoother: GuidedFilter,
            boundary: SequentialEuclidean,
            cancel: None,
        })
    }
}

impl<S, D> AlphaRefiner<S, D>
where
    S: ConfidenceSmoother,
    D: BoundaryDistance,
{
    #[must_use]
    pub fn with_smoother<T: ConfidenceSmoother>(self, smoother: T) -> AlphaRefiner<T, D> {
        AlphaRefiner {
            config: self.config,
            smoother,
            boundary: self.boundary,
            cancel: self.cancel,
        }
    }

    #[must_use]
    pub fn with_boundary_distance<T: BoundaryDistance>(self, boundary: T) -> AlphaRefiner<S, T> {
        AlphaRefiner {
            config: self.config,
            smoother: self.smoother,
            boundary,
            cancel: self.cancel,
        }
    }

    /// Shares a flag that aborts the refinement before the next iteration
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Runs the full refinement
    ///
    /// # Errors
    ///
    /// See [`AlphaRefiner::refine_with_observer`].
    pub fn refine(
        &self,
        image: &Image<Rgb<u8>>,
        masks: &TrimapMasks,
    ) -> Result<MatteState, MattingError> {
        self.refine_with_observer(image, masks, &mut ())
    }

    /// Runs the full refinement, reporting every snapshot to `observer`
    ///
    /// # Errors
    ///
    /// * `MattingError::EmptyImage` - if the image is empty
    /// * `MattingError::DimensionMismatch` - if masks and image differ in size
    /// * `MattingError::MissingRegion` - if unknown pixels exist and a mask is empty
    /// * `MattingError::Cancelled` - if the cancel flag was raised
    pub fn refine_with_observer(
        &self,
        image: &Image<Rgb<u8>>,
        masks: &TrimapMasks,
        observer: &mut dyn RefinementObserver,
    ) -> Result<MatteState, MattingError> {
        let initial = self.initial_estimate(image, masks)?;
        observer.on_initial_estimate(&initial);

        let (width, height) = image.dimensions();
        let colors = color_planes(image, 1.0 / 255.0);
        let threshold = self.config.convergence_threshold;
        let smoothers = self
            .config
            .scales
            .iter()
            .map(|scale| {
                self.smoother
                    .prepare(&colors, width, height, scale.radius, scale.epsilon)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (state, _) = (1..=self.config.iterations).try_fold(
            (initial, false),
            |(state, converged), iteration| -> Result<(MatteState, bool), MattingError> {
                if converged {
                    return Ok((state, true));
                }
                self.check_cancelled(iteration - 1)?;

                let next = self.iterate(&colors, masks, &state, &smoothers, width, height)?;
                let delta = next.max_alpha_delta(&state);
                debug!(
                    "iteration {iteration}/{}: max alpha delta {delta:.6}, mean confidence {:.4}",
                    self.config.iterations,
                    next.mean_confidence()
                );
                observer.on_iteration(iteration, &next);

                let converged = threshold.is_some_and(|t| delta < t);
                if converged {
                    debug!("converged after {iteration} iterations");
                }
                Ok((next, converged))
            },
        )?;

        Ok(state)
    }

    /// Validates the inputs and computes the initial matte only
    ///
    /// # Errors
    ///
    /// Same input errors as [`AlphaRefiner::refine_with_observer`].
    pub fn initial_estimate(
        &self,
        image: &Image<Rgb<u8>>,
        masks: &TrimapMasks,
    ) -> Result<MatteState, MattingError> {
        let (width, height) = image.dimensions();
        validate_non_empty(width, height)?;
        validate_matching_dimensions((width, height), masks.dimensions())?;

        let (foreground_map, background_map) = self.boundary_maps(masks)?;
        let raw_colors = color_planes(image, 1.0);

        Ok(estimate_initial_matte(
            &raw_colors,
            masks,
            foreground_map.as_ref(),
            background_map.as_ref(),
        ))
    }

    fn boundary_maps(
        &self,
        masks: &TrimapMasks,
    ) -> Result<(Option<BoundaryMap>, Option<BoundaryMap>), MattingError> {
        let (foreground, background, unknown) = masks.counts();
        debug!("trimap: {foreground} foreground, {background} background, {unknown} unknown pixels");
        if unknown == 0 {
            return Ok((None, None));
        }

        let (width, height) = masks.dimensions();
        let map = |mask: &[bool], region: Region| {
            self.boundary
                .boundary_map(mask, width, height)
                .ok_or(MattingError::MissingRegion { region })
        };

        Ok((
            Some(map(masks.foreground(), Region::Foreground)?),
            Some(map(masks.background(), Region::Background)?),
        ))
    }

    fn check_cancelled(&self, completed: usize) -> Result<(), MattingError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                debug!("cancelled after {completed} iterations");
                Err(MattingError::Cancelled { completed })
            }
            _ => Ok(()),
        }
    }

    fn iterate<'s>(
        &self,
        colors: &ColorPlanes,
        masks: &TrimapMasks,
        state: &MatteState,
        smoothers: &[Box<dyn PreparedSmoother + 's>],
        width: u32,
        height: u32,
    ) -> Result<MatteState, MattingError> {
        let pass = |(scale, smoother): (&WindowScale, &Box<dyn PreparedSmoother + 's>)| {
            scale_pass(smoother.as_ref(), colors, state, scale, width, height)
        };

        #[cfg(feature = "rayon")]
        let contributions = self
            .config
            .scales
            .par_iter()
            .zip(smoothers.par_iter())
            .map(pass)
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(not(feature = "rayon"))]
        let contributions = self
            .config
            .scales
            .iter()
            .zip(smoothers)
            .map(pass)
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = fuse(&contributions, colors, state, masks);
        if outcome.unresolved > 0 {
            warn!(
                "{} unknown pixels had zero confidence at every scale; keeping previous values",
                outcome.unresolved
            );
        }

        Ok(outcome.state)
    }
}

/// One window scale of one iteration
///
/// Reads only the frozen previous state and the normalized colors. The window
/// statistics are weighted by the state's own confidence, which is never
/// below `MIN_CONFIDENCE`; the smoothed confidence only weights the scale in
/// the fusion.
fn scale_pass(
    smoother: &dyn PreparedSmoother,
    colors: &ColorPlanes,
    state: &MatteState,
    scale: &WindowScale,
    width: u32,
    height: u32,
) -> Result<ScaleContribution, MattingError> {
    let fields: [&[f64]; 4] = [&colors[0], &colors[1], &colors[2], state.alpha()];
    let moments = windowed_mean_and_covariance(
        &fields,
        state.confidence(),
        width,
        height,
        scale.window_size(),
    );

    let pixel_count = state.alpha().len();
    let mut slopes: [Vec<f64>; 3] = std::array::from_fn(|_| Vec::with_capacity(pixel_count));
    let mut intercepts = Vec::with_capacity(pixel_count);

    for pixel in 0..pixel_count {
        let mean_color = std::array::from_fn(|c| moments.mean(c)[pixel]);
        let cov = |i, j| moments.covariance(i, j)[pixel];
        let color_covariance = SymmetricMatrix3::new(
            cov(0, 0),
            cov(0, 1),
            cov(0, 2),
            cov(1, 1),
            cov(1, 2),
            cov(2, 2),
        );
        let cross = [cov(0, 3), cov(1, 3), cov(2, 3)];

        let model = fit_local_linear_model(
            mean_color,
            moments.mean(3)[pixel],
            color_covariance,
            cross,
            scale.epsilon,
        );
        for (plane, slope) in slopes.iter_mut().zip(model.a) {
            plane.push(slope);
        }
        intercepts.push(model.b);
    }

    let mean = |field: &[f64]| box_mean(field, width, height, scale.radius);
    let averaged_slopes: [Vec<f64>; 3] = std::array::from_fn(|c| mean(&slopes[c]));
    let averaged_intercepts = mean(&intercepts);

    let models = (0..pixel_count)
        .map(|pixel| LocalLinearModel {
            a: std::array::from_fn(|c| averaged_slopes[c][pixel]),
            b: averaged_intercepts[pixel],
        })
        .collect();

    let window_confidence: Vec<f64> = smoother
        .apply(state.confidence())?
        .into_iter()
        .map(|c| c.clamp(0.0, 1.0))
        .collect();

    trace!(
        "scale radius {} epsilon {:e}: mean window confidence {:.4}",
        scale.radius,
        scale.epsilon,
        window_confidence.iter().sum::<f64>() / pixel_count as f64
    );

    Ok(ScaleContribution {
        weight: scale.weight,
        models,
        window_confidence,
    })
}

/// Refines the matte of `image` seeded by `masks`
///
/// Convenience wrapper around [`AlphaRefiner`] with the default collaborators.
///
/// # Errors
///
/// * `MattingError::InvalidScale` / `MattingError::InvalidParameter` - if the
///   config is invalid
/// * `MattingError::EmptyImage` - if the image is empty
/// * `MattingError::DimensionMismatch` - if masks and image differ in size
/// * `MattingError::MissingRegion` - if unknown pixels exist and a mask is empty
pub fn refine_alpha(
    image: &Image<Rgb<u8>>,
    masks: &TrimapMasks,
    config: &RefineConfig,
) -> Result<MatteState, MattingError> {
    AlphaRefiner::new(config.clone())?.refine(image, masks)
}

/// Trait for refining a matte directly from an 8-bit trimap
///
/// Classifies the trimap with [`TrimapThresholds::default`] and returns the
/// refined alpha scaled to 0–255.
pub trait RefineAlphaExt {
    /// Refines the matte of the image from `trimap`
    ///
    /// # Errors
    ///
    /// * `MattingError::DimensionMismatch` - if trimap and image differ in size
    /// * Any error of [`refine_alpha`]
    fn refine_matte(
        &self,
        trimap: &Image<Luma<u8>>,
        config: &RefineConfig,
    ) -> Result<Image<Luma<u8>>, MattingError> {
        self.refine_matte_with_thresholds(trimap, TrimapThresholds::default(), config)
    }

    /// Same as [`RefineAlphaExt::refine_matte`] with explicit trimap thresholds
    ///
    /// # Errors
    ///
    /// Same as [`RefineAlphaExt::refine_matte`], plus
    /// `MattingError::InvalidParameter` for inverted thresholds.
    fn refine_matte_with_thresholds(
        &self,
        trimap: &Image<Luma<u8>>,
        thresholds: TrimapThresholds,
        config: &RefineConfig,
    ) -> Result<Image<Luma<u8>>, MattingError>;
}

impl RefineAlphaExt for Image<Rgb<u8>> {
    fn refine_matte_with_thresholds(
        &self,
        trimap: &Image<Luma<u8>>,
        thresholds: TrimapThresholds,
        config: &RefineConfig,
    ) -> Result<Image<Luma<u8>>, MattingError> {
        validate_matching_dimensions(self.dimensions(), trimap.dimensions())?;
        let masks = TrimapMasks::from_trimap(trimap, thresholds)?;
        Ok(refine_alpha(self, &masks, config)?.alpha_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuidedFilterError;
    use crate::matting::state::MIN_CONFIDENCE;
    use crate::test_utils::{create_scenario, create_two_tone_row};

    /// Smoothing stand-in that returns a constant field
    struct ConstantSmoothing(f64);

    impl PreparedSmoother for ConstantSmoothing {
        fn apply(&self, target: &[f64]) -> Result<Vec<f64>, GuidedFilterError> {
            Ok(vec![self.0; target.len()])
        }
    }

    fn scattered_colors(width: u32, height: u32) -> ColorPlanes {
        let n = (width * height) as usize;
        [
            (0..n).map(|i| ((i * 37) % 11) as f64 / 10.0).collect(),
            (0..n).map(|i| ((i * 53) % 13) as f64 / 12.0).collect(),
            (0..n).map(|i| ((i * 29) % 7) as f64 / 6.0).collect(),
        ]
    }

    fn assert_state_invariants(state: &MatteState, masks: &TrimapMasks) {
        for (i, (&a, &c)) in state.alpha().iter().zip(state.confidence()).enumerate() {
            assert!((0.0..=1.0).contains(&a), "alpha {a} at {i}");
            assert!((MIN_CONFIDENCE..=1.0).contains(&c), "confidence {c} at {i}");
            if let Some((fixed_alpha, fixed_confidence)) = masks.constraint(i) {
                assert_eq!(a, fixed_alpha);
                assert_eq!(c, fixed_confidence);
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        initial: usize,
        iterations: Vec<usize>,
        masks: Option<TrimapMasks>,
    }

    impl RefinementObserver for Recorder {
        fn on_initial_estimate(&mut self, state: &MatteState) {
            self.initial += 1;
            if let Some(masks) = &self.masks {
                assert_state_invariants(state, masks);
            }
        }

        fn on_iteration(&mut self, iteration: usize, state: &MatteState) {
            self.iterations.push(iteration);
            if let Some(masks) = &self.masks {
                assert_state_invariants(state, masks);
            }
        }
    }

    #[test]
    fn test_regression_is_weighted_by_state_confidence() {
        let (width, height) = (4, 3);
        let colors = scattered_colors(width, height);
        let alpha: Vec<f64> = (0..12).map(|i| ((i * 17) % 10) as f64 / 9.0).collect();
        let mut confidence = vec![1.0; 12];
        confidence[0] = MIN_CONFIDENCE;
        confidence[5] = MIN_CONFIDENCE;
        let confident = MatteState::new(width, height, alpha.clone(), vec![1.0; 12]);
        let doubtful = MatteState::new(width, height, alpha, confidence);
        let scale = WindowScale::new(3, 1e-4, 1.0);
        let smoothing = ConstantSmoothing(1.0);

        let first = scale_pass(&smoothing, &colors, &confident, &scale, width, height).unwrap();
        let second = scale_pass(&smoothing, &colors, &doubtful, &scale, width, height).unwrap();

        // Same smoothed confidence, different regression weights
        assert_eq!(first.window_confidence, second.window_confidence);
        assert_ne!(first.models, second.models);
    }

    #[test]
    fn test_zero_smoothed_confidence_does_not_zero_models() {
        let (width, height) = (5, 4);
        let colors = scattered_colors(width, height);
        let state = MatteState::new(width, height, vec![0.7; 20], vec![MIN_CONFIDENCE; 20]);
        let scale = WindowScale::new(1, 1e-4, 1.0);

        let contribution =
            scale_pass(&ConstantSmoothing(0.0), &colors, &state, &scale, width, height).unwrap();

        assert!(contribution.window_confidence.iter().all(|&c| c == 0.0));
        for pixel in 0..20 {
            assert!((contribution.candidate(&colors, pixel) - 0.7).abs() < 1e-9);
        }
    }

    #[test]
    fn test_smoothed_confidence_is_clamped() {
        let (width, height) = (3, 3);
        let colors = scattered_colors(width, height);
        let state = MatteState::new(width, height, vec![0.4; 9], vec![0.5; 9]);
        let scale = WindowScale::new(1, 1e-4, 2.0);

        let contribution =
            scale_pass(&ConstantSmoothing(1.5), &colors, &state, &scale, width, height).unwrap();

        assert_eq!(contribution.weight, 2.0);
        assert!(contribution.window_confidence.iter().all(|&c| c == 1.0));
    }

    #[test]
    fn test_guide_is_prepared_once_per_scale() {
        use std::sync::atomic::AtomicUsize;

        struct CountingFilter(Arc<AtomicUsize>);

        impl ConfidenceSmoother for CountingFilter {
            fn prepare<'a>(
                &self,
                guide: &'a ColorPlanes,
                width: u32,
                height: u32,
                radius: u32,
                epsilon: f64,
            ) -> Result<Box<dyn PreparedSmoother + 'a>, GuidedFilterError> {
                self.0.fetch_add(1, Ordering::Relaxed);
                GuidedFilter.prepare(guide, width, height, radius, epsilon)
            }
        }

        let (image, masks) = create_scenario();
        let config = RefineConfig::default()
            .with_iterations(4)
            .with_scales(vec![WindowScale::new(2, 1e-4, 1.0), WindowScale::new(4, 1e-4, 1.0)]);
        let prepared = Arc::new(AtomicUsize::new(0));
        let refiner = AlphaRefiner::new(config.clone())
            .unwrap()
            .with_smoother(CountingFilter(Arc::clone(&prepared)));

        let counted = refiner.refine(&image, &masks).unwrap();

        assert_eq!(prepared.load(Ordering::Relaxed), 2);
        assert_eq!(counted, refine_alpha(&image, &masks, &config).unwrap());
    }

    #[test]
    fn test_default_config() {
        let config = RefineConfig::default();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.scales, vec![WindowScale::new(3, 1e-5, 1.0)]);
        assert_eq!(config.convergence_threshold, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let empty = RefineConfig::default().with_scales(vec![]);
        assert!(matches!(
            empty.validate(),
            Err(MattingError::InvalidParameter(_))
        ));

        let bad_scales = [
            WindowScale::new(0, 1e-5, 1.0),
            WindowScale::new(2, 0.0, 1.0),
            WindowScale::new(2, f64::INFINITY, 1.0),
            WindowScale::new(2, 1e-5, -1.0),
            WindowScale::new(2, 1e-5, f64::NAN),
        ];
        for bad in bad_scales {
            let config =
                RefineConfig::default().with_scales(vec![WindowScale::default(), bad]);
            assert!(matches!(
                config.validate(),
                Err(MattingError::InvalidScale { index: 1, .. })
            ));
        }

        let threshold = RefineConfig::default().with_convergence_threshold(f64::NAN);
        assert!(threshold.validate().is_err());
        assert!(AlphaRefiner::new(threshold).is_err());
    }

    #[test]
    fn test_pyramid() {
        let scales = WindowScale::pyramid(3, 50, 1e-4);
        let radii: Vec<u32> = scales.iter().map(|s| s.radius).collect();
        assert_eq!(radii, vec![3, 6, 12, 24, 48]);
        assert!(scales.iter().all(|s| s.epsilon == 1e-4 && s.weight == 1.0));

        assert!(WindowScale::pyramid(0, 50, 1e-4).is_empty());
        assert!(WindowScale::pyramid(8, 8, 1e-4).is_empty());
    }

    #[test]
    fn test_scenario_reaches_hard_values() {
        let (image, masks) = create_scenario();
        let state = refine_alpha(&image, &masks, &RefineConfig::default()).unwrap();

        assert_state_invariants(&state, &masks);
        assert_eq!(state.alpha_at(50, 50), 1.0);
        assert_eq!(state.alpha_at(0, 0), 0.0);
        assert_eq!(state.alpha_at(99, 99), 0.0);
    }

    #[test]
    fn test_observer_sees_every_iteration() {
        let (image, masks) = create_scenario();
        let refiner = AlphaRefiner::new(RefineConfig::default().with_iterations(3)).unwrap();
        let mut recorder = Recorder {
            masks: Some(masks.clone()),
            ..Recorder::default()
        };

        refiner
            .refine_with_observer(&image, &masks, &mut recorder)
            .unwrap();

        assert_eq!(recorder.initial, 1);
        assert_eq!(recorder.iterations, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_iterations_returns_initial_estimate() {
        let (image, masks) = create_scenario();
        let refiner = AlphaRefiner::new(RefineConfig::default().with_iterations(0)).unwrap();

        let initial = refiner.initial_estimate(&image, &masks).unwrap();
        let refined = refiner.refine(&image, &masks).unwrap();
        assert_eq!(initial, refined);
    }

    #[test]
    fn test_runs_are_bit_identical() {
        let (image, masks) = create_scenario();
        let config = RefineConfig::default()
            .with_iterations(3)
            .with_scales(vec![
                WindowScale::new(2, 1e-4, 1.0),
                WindowScale::new(5, 1e-3, 0.5),
            ]);

        let first = refine_alpha(&image, &masks, &config).unwrap();
        let second = refine_alpha(&image, &masks, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cancel_before_first_iteration() {
        let (image, masks) = create_scenario();
        let flag = Arc::new(AtomicBool::new(true));
        let refiner = AlphaRefiner::new(RefineConfig::default())
            .unwrap()
            .with_cancel_flag(Arc::clone(&flag));

        assert_eq!(
            refiner.refine(&image, &masks),
            Err(MattingError::Cancelled { completed: 0 })
        );
    }

    #[test]
    fn test_cancel_from_observer() {
        struct CancelAfter {
            flag: Arc<AtomicBool>,
            after: usize,
        }

        impl RefinementObserver for CancelAfter {
            fn on_iteration(&mut self, iteration: usize, _state: &MatteState) {
                if iteration == self.after {
                    self.flag.store(true, Ordering::Relaxed);
                }
            }
        }

        let (image, masks) = create_scenario();
        let flag = Arc::new(AtomicBool::new(false));
        let refiner = AlphaRefiner::new(RefineConfig::default())
            .unwrap()
            .with_cancel_flag(Arc::clone(&flag));
        let mut observer = CancelAfter { flag, after: 2 };

        assert_eq!(
            refiner.refine_with_observer(&image, &masks, &mut observer),
            Err(MattingError::Cancelled { completed: 2 })
        );
    }

    #[test]
    fn test_convergence_stops_early() {
        // Every pixel is known, so nothing changes after the first pass
        let (image, _) = create_scenario();
        let masks = TrimapMasks::new(
            100,
            100,
            vec![true; 10_000],
            vec![false; 10_000],
        )
        .unwrap();
        let refiner = AlphaRefiner::new(
            RefineConfig::default().with_convergence_threshold(1e-9),
        )
        .unwrap();
        let mut recorder = Recorder::default();

        let state = refiner
            .refine_with_observer(&image, &masks, &mut recorder)
            .unwrap();

        assert_eq!(recorder.iterations, vec![1]);
        assert!(state.alpha().iter().all(|&a| a == 1.0));
    }

    #[test]
    fn test_degenerate_boundary_colors_start_at_half() {
        let (image, masks) = create_two_tone_row(128, 128);
        let refiner = AlphaRefiner::new(RefineConfig::default()).unwrap();

        let initial = refiner.initial_estimate(&image, &masks).unwrap();
        let (_, _, unknown) = masks.counts();
        assert!(unknown > 0);
        for i in 0..masks.pixel_count() {
            if masks.constraint(i).is_none() {
                assert_eq!(initial.alpha()[i], 0.5);
            }
        }
    }

    #[test]
    fn test_missing_region() {
        let (image, _) = create_scenario();
        let mut foreground = vec![false; 10_000];
        foreground[0] = true;
        let masks = TrimapMasks::new(100, 100, foreground, vec![false; 10_000]).unwrap();

        assert_eq!(
            refine_alpha(&image, &masks, &RefineConfig::default()),
            Err(MattingError::MissingRegion {
                region: Region::Background
            })
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let (image, _) = create_scenario();
        let masks = TrimapMasks::new(2, 2, vec![true, false, false, false], vec![false; 4]).unwrap();

        assert!(matches!(
            refine_alpha(&image, &masks, &RefineConfig::default()),
            Err(MattingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_extension_trait() {
        let (image, masks) = create_scenario();
        let trimap: Image<Luma<u8>> = Image::from_fn(100, 100, |x, y| {
            let i = (y * 100 + x) as usize;
            match masks.region(i) {
                Region::Foreground => Luma([255]),
                Region::Background => Luma([0]),
                Region::Unknown => Luma([128]),
            }
        });
        let config = RefineConfig::default().with_iterations(2);

        let matte = image.refine_matte(&trimap, &config).unwrap();
        let expected = refine_alpha(&image, &masks, &config).unwrap().alpha_image();
        assert_eq!(matte, expected);
        assert_eq!(matte.get_pixel(50, 50)[0], 255);
        assert_eq!(matte.get_pixel(0, 0)[0], 0);

        let small: Image<Luma<u8>> = Image::new(10, 10);
        assert!(matches!(
            image.refine_matte(&small, &config),
            Err(MattingError::DimensionMismatch { .. })
        ));
    }
}

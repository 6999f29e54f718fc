//! Confidence-weighted multi-scale alpha matte refinement.
//!
//! Given an RGB image and a trimap (definite foreground, definite background,
//! unknown), the crate estimates a per-pixel alpha matte. Unknown pixels start
//! from a projection onto their nearest foreground and background colors and
//! are then refined by confidence-weighted local linear regression over one or
//! more window scales.
//!
//! ```rust
//! use imageops_matting::{RefineAlphaExt, RefineConfig, WindowScale};
//! use imageproc::definitions::Image;
//! use image::{Luma, Rgb};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let image: Image<Rgb<u8>> = Image::new(64, 64);
//! let trimap: Image<Luma<u8>> = Image::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));
//!
//! let config = RefineConfig::default().with_scales(WindowScale::pyramid(3, 32, 1e-5));
//! let matte = image.refine_matte(&trimap, &config)?;
//! # Ok(())
//! # }
//! ```

mod error;
mod matting;
mod utils;

#[cfg(test)]
mod test_utils;

pub use error::{GuidedFilterError, MattingError};
pub use matting::boundary_distance::{
    compute_boundary_map, BoundaryDistance, BoundaryMap, SequentialEuclidean,
};
pub use matting::guided_filter::{
    ConfidenceSmoother, GuidedFilter, GuidedFilterColor, PreparedSmoother,
};
pub use matting::initial_estimate::{
    estimate_initial_matte, mixing_alpha, mixing_confidence, COLOR_RESIDUAL_VARIANCE,
    DEGENERATE_ALPHA,
};
pub use matting::local_linear::{fit_local_linear_model, LocalLinearModel, SymmetricMatrix3};
pub use matting::refine::{
    refine_alpha, AlphaRefiner, RefineAlphaExt, RefineConfig, RefinementObserver, WindowScale,
    DEFAULT_ITERATIONS,
};
pub use matting::state::{MatteState, MIN_CONFIDENCE};
pub use matting::summed_area_table::SummedAreaTable;
pub use matting::trimap::{Region, TrimapMasks, TrimapThresholds};
pub use matting::windowed_statistics::{
    box_mean, windowed_mean_and_covariance, WeightedWindow, WindowedMoments,
};
pub use utils::{color_planes, ColorPlanes};

pub use imageproc::definitions::Image;

use crate::matting::trimap::Region;
use thiserror::Error;

/// Error type for alpha matte refinement
///
/// Every variant except `Cancelled` is a precondition violation detected once
/// at pipeline entry. Per-pixel degeneracies are recovered locally and never
/// surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MattingError {
    /// The image has zero width or height
    #[error("Image dimensions must be non-zero")]
    EmptyImage,

    /// Image, mask or trimap dimensions do not agree
    #[error("Dimensions do not match: expected {expected:?}, actual {actual:?}")]
    DimensionMismatch {
        /// Expected dimensions (width, height)
        expected: (u32, u32),
        /// Actual dimensions (width, height)
        actual: (u32, u32),
    },

    /// A pixel is marked as both foreground and background
    ///
    /// The two region masks must be disjoint; the classifier refuses to pick
    /// one label silently.
    #[error("Pixel ({x}, {y}) is marked as both foreground and background")]
    MaskOverlap { x: u32, y: u32 },

    /// Unknown pixels exist but the given region has no pixels at all
    ///
    /// The initial estimate needs a nearest foreground and a nearest
    /// background color for every unknown pixel.
    #[error("Trimap has unknown pixels but no {region} pixels")]
    MissingRegion { region: Region },

    /// A window scale descriptor is unusable
    #[error("Invalid window scale #{index}: {reason}")]
    InvalidScale { index: usize, reason: String },

    /// Invalid parameter provided to the operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Refinement was cancelled between iterations
    #[error("Refinement cancelled after {completed} iterations")]
    Cancelled { completed: usize },
}

/// Error type for guided filter operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuidedFilterError {
    /// Radius must be at least 1
    #[error("Guided filter radius must be positive, got {radius}")]
    InvalidRadius { radius: u32 },

    /// Epsilon must be strictly positive
    #[error("Guided filter epsilon must be positive, got {epsilon}")]
    InvalidEpsilon { epsilon: f64 },

    /// Guidance and input sizes differ
    #[error("Guidance dimensions {guidance_dims:?} do not match input dimensions {input_dims:?}")]
    DimensionMismatch {
        guidance_dims: (u32, u32),
        input_dims: (u32, u32),
    },
}

impl From<GuidedFilterError> for MattingError {
    fn from(err: GuidedFilterError) -> Self {
        match err {
            GuidedFilterError::DimensionMismatch {
                guidance_dims,
                input_dims,
            } => Self::DimensionMismatch {
                expected: guidance_dims,
                actual: input_dims,
            },
            other => Self::InvalidParameter(other.to_string()),
        }
    }
}

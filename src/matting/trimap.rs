use crate::error::MattingError;
use crate::utils::validate_non_empty;
use image::Luma;
use imageproc::definitions::Image;

/// Region of a trimap pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Region {
    Foreground,
    Background,
    Unknown,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Cutoffs that turn an 8-bit trimap into region masks
///
/// A value strictly above `foreground` is foreground, a value strictly below
/// `background` is background, anything else is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrimapThresholds {
    pub foreground: u8,
    pub background: u8,
}

impl Default for TrimapThresholds {
    fn default() -> Self {
        Self {
            foreground: 200,
            background: 100,
        }
    }
}

impl TrimapThresholds {
    #[must_use]
    pub const fn classify(&self, value: u8) -> Region {
        if value > self.foreground {
            Region::Foreground
        } else if value < self.background {
            Region::Background
        } else {
            Region::Unknown
        }
    }
}

/// Disjoint foreground and background masks over a `width × height` grid
///
/// Pixels in neither mask are unknown. Construction rejects overlapping masks,
/// so every pixel has exactly one [`Region`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimapMasks {
    width: u32,
    height: u32,
    foreground: Vec<bool>,
    background: Vec<bool>,
}

impl TrimapMasks {
    /// Builds masks from two row-major boolean fields
    ///
    /// # Errors
    ///
    /// * `MattingError::EmptyImage` - if either dimension is zero
    /// * `MattingError::InvalidParameter` - if a mask length is not `width * height`
    /// * `MattingError::MaskOverlap` - if a pixel is in both masks
    pub fn new(
        width: u32,
        height: u32,
        foreground: Vec<bool>,
        background: Vec<bool>,
    ) -> Result<Self, MattingError> {
        validate_non_empty(width, height)?;

        let pixel_count = width as usize * height as usize;
        for (name, mask) in [("foreground", &foreground), ("background", &background)] {
            if mask.len() != pixel_count {
                return Err(MattingError::InvalidParameter(format!(
                    "{name} mask has {} entries, expected {pixel_count}",
                    mask.len()
                )));
            }
        }

        if let Some(index) = foreground
            .iter()
            .zip(&background)
            .position(|(&fg, &bg)| fg && bg)
        {
            return Err(MattingError::MaskOverlap {
                x: (index % width as usize) as u32,
                y: (index / width as usize) as u32,
            });
        }

        Ok(Self {
            width,
            height,
            foreground,
            background,
        })
    }

    /// Thresholds an 8-bit trimap into masks
    ///
    /// # Errors
    ///
    /// * `MattingError::EmptyImage` - if the trimap is empty
    /// * `MattingError::InvalidParameter` - if `thresholds.background > thresholds.foreground`
    pub fn from_trimap(
        trimap: &Image<Luma<u8>>,
        thresholds: TrimapThresholds,
    ) -> Result<Self, MattingError> {
        if thresholds.background > thresholds.foreground {
            return Err(MattingError::InvalidParameter(format!(
                "background threshold {} exceeds foreground threshold {}",
                thresholds.background, thresholds.foreground
            )));
        }

        let (width, height) = trimap.dimensions();
        let (foreground, background): (Vec<bool>, Vec<bool>) = trimap
            .pixels()
            .map(|&Luma([value])| match thresholds.classify(value) {
                Region::Foreground => (true, false),
                Region::Background => (false, true),
                Region::Unknown => (false, false),
            })
            .unzip();

        Self::new(width, height, foreground, background)
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.foreground.len()
    }

    #[must_use]
    pub fn foreground(&self) -> &[bool] {
        &self.foreground
    }

    #[must_use]
    pub fn background(&self) -> &[bool] {
        &self.background
    }

    /// Region of the pixel at row-major `index`
    #[inline]
    #[must_use]
    pub fn region(&self, index: usize) -> Region {
        if self.foreground[index] {
            Region::Foreground
        } else if self.background[index] {
            Region::Background
        } else {
            Region::Unknown
        }
    }

    /// Number of pixels in each region as `(foreground, background, unknown)`
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let fg = self.foreground.iter().filter(|&&v| v).count();
        let bg = self.background.iter().filter(|&&v| v).count();
        (fg, bg, self.pixel_count() - fg - bg)
    }

    /// Hard constraint `(alpha, confidence)` of a known pixel, `None` if unknown
    #[inline]
    #[must_use]
    pub fn constraint(&self, index: usize) -> Option<(f64, f64)> {
        match self.region(index) {
            Region::Foreground => Some((1.0, 1.0)),
            Region::Background => Some((0.0, 1.0)),
            Region::Unknown => None,
        }
    }
}

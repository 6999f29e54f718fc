//! Nearest-boundary transform for region masks.
//!
//! For every pixel, finds the closest pixel of a mask together with the
//! Euclidean distance to it. The initial estimator reads the colors of these
//! nearest pixels as the local foreground and background samples.
//!
//! The transform propagates nearest-seed candidates in two raster passes
//! (forward, then backward), each followed by a reverse sweep of the row, in
//! the manner of the 8-point sequential Euclidean distance transform. The
//! result is exact for seeds and within a small fraction of a pixel of the
//! brute-force Euclidean distance elsewhere.

/// Nearest mask pixel and its distance, per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryMap {
    width: u32,
    height: u32,
    nearest: Vec<usize>,
    distance: Vec<f64>,
}

impl BoundaryMap {
    /// Row-major index of the nearest mask pixel for each pixel
    #[must_use]
    pub fn nearest(&self) -> &[usize] {
        &self.nearest
    }

    /// Euclidean distance to the nearest mask pixel for each pixel
    #[must_use]
    pub fn distance(&self) -> &[f64] {
        &self.distance
    }

    #[inline]
    #[must_use]
    pub fn nearest_at(&self, index: usize) -> usize {
        self.nearest[index]
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Source of nearest-boundary maps
///
/// The refiner only needs `nearest[p] == p` and `distance[p] == 0` for mask
/// pixels; how the rest is computed is up to the implementation.
pub trait BoundaryDistance {
    /// Computes the map for a non-empty row-major `mask`
    ///
    /// Returns `None` when the mask has no true pixel.
    fn boundary_map(&self, mask: &[bool], width: u32, height: u32) -> Option<BoundaryMap>;
}

/// Two-pass sequential nearest-seed propagation
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialEuclidean;

impl BoundaryDistance for SequentialEuclidean {
    fn boundary_map(&self, mask: &[bool], width: u32, height: u32) -> Option<BoundaryMap> {
        compute_boundary_map(mask, width, height)
    }
}

const NO_SEED: usize = usize::MAX;

struct Propagation<'a> {
    width: i64,
    height: i64,
    nearest: &'a mut [usize],
    squared: &'a mut [i64],
}

impl Propagation<'_> {
    #[inline]
    fn squared_distance(&self, index: usize, seed: usize) -> i64 {
        let w = self.width as usize;
        let dx = (index % w) as i64 - (seed % w) as i64;
        let dy = (index / w) as i64 - (seed / w) as i64;
        dx * dx + dy * dy
    }

    /// Adopts the neighbor's seed at `(x + dx, y + dy)` if it is closer
    #[inline]
    fn relax(&mut self, x: i64, y: i64, dx: i64, dy: i64) {
        let (nx, ny) = (x + dx, y + dy);
        if nx < 0 || ny < 0 || nx >= self.width || ny >= self.height {
            return;
        }

        let seed = self.nearest[(ny * self.width + nx) as usize];
        if seed == NO_SEED {
            return;
        }

        let index = (y * self.width + x) as usize;
        let candidate = self.squared_distance(index, seed);
        if candidate < self.squared[index] {
            self.squared[index] = candidate;
            self.nearest[index] = seed;
        }
    }
}

/// Computes the nearest-boundary map of `mask`
///
/// Returns `None` when no pixel of `mask` is set.
///
/// # Panics
///
/// Panics if `mask.len() != width * height`.
#[must_use]
pub fn compute_boundary_map(mask: &[bool], width: u32, height: u32) -> Option<BoundaryMap> {
    assert_eq!(mask.len(), width as usize * height as usize);
    if !mask.contains(&true) {
        return None;
    }

    let mut nearest: Vec<usize> = mask
        .iter()
        .enumerate()
        .map(|(i, &set)| if set { i } else { NO_SEED })
        .collect();
    let mut squared: Vec<i64> = mask
        .iter()
        .map(|&set| if set { 0 } else { i64::MAX })
        .collect();

    let (w, h) = (i64::from(width), i64::from(height));
    let mut pass = Propagation {
        width: w,
        height: h,
        nearest: &mut nearest,
        squared: &mut squared,
    };

    for y in 0..h {
        for x in 0..w {
            pass.relax(x, y, -1, 0);
            pass.relax(x, y, -1, -1);
            pass.relax(x, y, 0, -1);
            pass.relax(x, y, 1, -1);
        }
        for x in (0..w).rev() {
            pass.relax(x, y, 1, 0);
        }
    }

    for y in (0..h).rev() {
        for x in (0..w).rev() {
            pass.relax(x, y, 1, 0);
            pass.relax(x, y, 1, 1);
            pass.relax(x, y, 0, 1);
            pass.relax(x, y, -1, 1);
        }
        for x in 0..w {
            pass.relax(x, y, -1, 0);
        }
    }

    let distance = squared.iter().map(|&d| (d as f64).sqrt()).collect();

    Some(BoundaryMap {
        width,
        height,
        nearest,
        distance,
    })
}

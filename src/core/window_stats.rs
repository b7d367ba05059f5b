use crate::types::{SarError, SarRealImage, SarResult};
use ndarray::{Array2, ArrayViewMut2, Axis};

/// Outer window sizes with a calibrated guard band
pub const SUPPORTED_WINDOW_SIZES: [usize; 2] = [29, 49];

/// The inner (guard) window is this many pixels narrower than the outer one
pub const GUARD_BAND_REDUCTION: usize = 8;

/// Rows per parallel tile
const TILE_ROWS: usize = 64;

/// Background ("clutter") estimator over an annular window
///
/// For every valid pixel the engine averages the non-NaN samples inside a
/// square outer window while ignoring the centred inner window, so that the
/// object under test does not bias its own background estimate.
#[derive(Debug, Clone, Copy)]
pub struct WindowStatsEngine {
    outer_window_size: usize,
    inner_window_size: usize,
}

/// Summed-area tables of finite samples and their count, (rows + 1) x (cols + 1)
struct IntegralImage {
    sums: Array2<f64>,
    counts: Array2<u32>,
}

impl IntegralImage {
    fn new(values: &SarRealImage) -> Self {
        let (height, width) = values.dim();
        let mut sums = Array2::<f64>::zeros((height + 1, width + 1));
        let mut counts = Array2::<u32>::zeros((height + 1, width + 1));

        for i in 0..height {
            let mut row_sum = 0.0;
            let mut row_count = 0u32;
            for j in 0..width {
                let value = values[[i, j]];
                if !value.is_nan() {
                    row_sum += value as f64;
                    row_count += 1;
                }
                sums[[i + 1, j + 1]] = sums[[i, j + 1]] + row_sum;
                counts[[i + 1, j + 1]] = counts[[i, j + 1]] + row_count;
            }
        }

        Self { sums, counts }
    }

    /// Sum and count over the square of half-size `half` centred on (i, j),
    /// clipped to the raster
    fn window(&self, i: usize, j: usize, half: usize) -> (f64, u32) {
        let (rows, cols) = self.sums.dim();
        let r0 = i.saturating_sub(half);
        let c0 = j.saturating_sub(half);
        let r1 = (i + half + 1).min(rows - 1);
        let c1 = (j + half + 1).min(cols - 1);

        let sum = self.sums[[r1, c1]] - self.sums[[r0, c1]] - self.sums[[r1, c0]] + self.sums[[r0, c0]];
        let count = self.counts[[r1, c1]] + self.counts[[r0, c0]] - self.counts[[r0, c1]] - self.counts[[r1, c0]];
        (sum, count)
    }
}

impl WindowStatsEngine {
    /// Create an engine for one of the supported outer window sizes
    pub fn new(outer_window_size: usize) -> SarResult<Self> {
        if !SUPPORTED_WINDOW_SIZES.contains(&outer_window_size) {
            return Err(SarError::InvalidWindowSize(outer_window_size));
        }
        Ok(Self {
            outer_window_size,
            inner_window_size: outer_window_size - GUARD_BAND_REDUCTION,
        })
    }

    pub fn outer_window_size(&self) -> usize {
        self.outer_window_size
    }

    pub fn inner_window_size(&self) -> usize {
        self.inner_window_size
    }

    /// Annulus mean of `values` for every pixel where `valid` is true
    ///
    /// Invalid pixels get NaN. A valid pixel without any finite neighbour in
    /// the annulus gets 0.
    pub fn annulus_mean(&self, values: &SarRealImage, valid: &Array2<bool>) -> SarResult<SarRealImage> {
        if values.dim() != valid.dim() {
            return Err(SarError::InvalidFormat(format!(
                "Validity mask {:?} does not match raster {:?}",
                valid.dim(),
                values.dim()
            )));
        }

        let (height, width) = values.dim();
        log::debug!(
            "Annulus mean over {}x{} pixels (outer {}, inner {})",
            height,
            width,
            self.outer_window_size,
            self.inner_window_size
        );

        let integral = IntegralImage::new(values);
        let mut output = Array2::<f32>::zeros((height, width));
        if height == 0 || width == 0 {
            return Ok(output);
        }

        #[cfg(feature = "parallel")]
        {
            use ndarray::parallel::prelude::*;

            output
                .axis_chunks_iter_mut(Axis(0), TILE_ROWS)
                .into_par_iter()
                .enumerate()
                .for_each(|(tile_idx, tile)| {
                    self.fill_tile(tile, tile_idx * TILE_ROWS, valid, &integral);
                });
        }

        #[cfg(not(feature = "parallel"))]
        {
            for (tile_idx, tile) in output.axis_chunks_iter_mut(Axis(0), TILE_ROWS).enumerate() {
                self.fill_tile(tile, tile_idx * TILE_ROWS, valid, &integral);
            }
        }

        Ok(output)
    }

    fn fill_tile(
        &self,
        mut tile: ArrayViewMut2<f32>,
        start_row: usize,
        valid: &Array2<bool>,
        integral: &IntegralImage,
    ) {
        let outer_half = self.outer_window_size / 2;
        let inner_half = self.inner_window_size / 2;

        for (local_row, mut row) in tile.axis_iter_mut(Axis(0)).enumerate() {
            let i = start_row + local_row;
            for (j, out) in row.iter_mut().enumerate() {
                if !valid[[i, j]] {
                    *out = f32::NAN;
                    continue;
                }
                let (outer_sum, outer_count) = integral.window(i, j, outer_half);
                let (inner_sum, inner_count) = integral.window(i, j, inner_half);
                let count = outer_count - inner_count;
                *out = if count == 0 {
                    0.0
                } else {
                    ((outer_sum - inner_sum) / count as f64) as f32
                };
            }
        }
    }
}

use crate::types::{PpcError, PpcResult};
use ndarray::Array2;
use std::collections::HashMap;

/// Filter window extent in rays and bins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub rays: usize,
    pub bins: usize,
}

impl Window {
    pub fn new(rays: usize, bins: usize) -> Self {
        Self { rays, bins }
    }

    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }
}

/// Polar data field indexed `[ray, bin]` with optional nodata semantics.
///
/// A cell is valid if nodata handling is disabled, or if it is enabled and
/// the value differs from the nodata sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    data: Array2<f64>,
    nodata: f64,
    use_nodata: bool,
}

impl Grid {
    /// Wrap an array without nodata handling
    pub fn new(data: Array2<f64>) -> Self {
        Self {
            data,
            nodata: 0.0,
            use_nodata: false,
        }
    }

    /// Wrap an array with nodata handling enabled
    pub fn with_nodata(data: Array2<f64>, nodata: f64) -> Self {
        Self {
            data,
            nodata,
            use_nodata: true,
        }
    }

    pub fn zeros(nrays: usize, nbins: usize) -> Self {
        Self::new(Array2::zeros((nrays, nbins)))
    }

    pub fn filled(nrays: usize, nbins: usize, value: f64) -> Self {
        Self::new(Array2::from_elem((nrays, nbins), value))
    }

    /// Build a grid from row-major ray vectors, all of equal length
    pub fn from_rows(rows: &[Vec<f64>]) -> PpcResult<Self> {
        let nrays = rows.len();
        let nbins = rows.first().map_or(0, |r| r.len());
        if let Some(bad) = rows.iter().find(|r| r.len() != nbins) {
            return Err(PpcError::invalid_argument(format!(
                "ragged rows: expected {} bins, found a ray with {}",
                nbins,
                bad.len()
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((nrays, nbins), flat)
            .map_err(|e| PpcError::invalid_argument(e.to_string()))?;
        Ok(Self::new(data))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.outer_iter().map(|row| row.to_vec()).collect()
    }

    /// (rays, bins)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn nrays(&self) -> usize {
        self.data.nrows()
    }

    pub fn nbins(&self) -> usize {
        self.data.ncols()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    pub fn uses_nodata(&self) -> bool {
        self.use_nodata
    }

    /// Enable nodata handling with the given sentinel
    pub fn set_nodata(&mut self, nodata: f64) {
        self.nodata = nodata;
        self.use_nodata = true;
    }

    pub fn disable_nodata(&mut self) {
        self.use_nodata = false;
    }

    pub fn get(&self, ray: usize, bin: usize) -> f64 {
        self.data[[ray, bin]]
    }

    pub fn set(&mut self, ray: usize, bin: usize, value: f64) {
        self.data[[ray, bin]] = value;
    }

    pub fn is_valid_value(&self, value: f64) -> bool {
        !self.use_nodata || value != self.nodata
    }

    pub fn is_valid(&self, ray: usize, bin: usize) -> bool {
        self.is_valid_value(self.data[[ray, bin]])
    }

    /// Minimum over valid cells
    pub fn valid_min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|&v| self.is_valid_value(v))
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    /// Minimum over all cells, nodata included
    pub fn raw_min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    /// True if any valid cell is strictly above `threshold`
    pub fn any_valid_above(&self, threshold: f64) -> bool {
        self.data
            .iter()
            .any(|&v| self.is_valid_value(v) && v > threshold)
    }

    /// Apply `f` to valid cells, leaving nodata cells untouched
    pub fn map_valid<F>(&self, f: F) -> Grid
    where
        F: Fn(f64) -> f64,
    {
        let mut out = self.clone();
        let (nodata, use_nodata) = (self.nodata, self.use_nodata);
        out.data.mapv_inplace(|v| {
            if use_nodata && v == nodata {
                v
            } else {
                f(v)
            }
        });
        out
    }

    pub fn scaled(&self, factor: f64) -> Grid {
        self.map_valid(|v| v * factor)
    }

    /// Cumulative sum along each ray
    pub fn cumsum_bins(&self) -> Grid {
        let mut out = self.clone();
        for mut ray in out.data.rows_mut() {
            let mut acc = 0.0;
            for v in ray.iter_mut() {
                acc += *v;
                *v = acc;
            }
        }
        out
    }

    /// Sample standard deviation along each ray over `[bin - half, bin + half]`.
    /// The window is truncated at the ray ends and skips nodata; fewer than two
    /// samples give zero.
    pub fn moving_std_bins(&self, half_window: usize) -> Grid {
        let (nrays, nbins) = self.dim();
        let mut out = Array2::zeros((nrays, nbins));
        for ray in 0..nrays {
            for bin in 0..nbins {
                if !self.is_valid(ray, bin) {
                    out[[ray, bin]] = self.nodata;
                    continue;
                }
                let lo = bin.saturating_sub(half_window);
                let hi = (bin + half_window + 1).min(nbins);
                let values: Vec<f64> = (lo..hi)
                    .map(|b| self.data[[ray, b]])
                    .filter(|&v| self.is_valid_value(v))
                    .collect();
                if values.len() < 2 {
                    continue;
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                out[[ray, bin]] = var.sqrt();
            }
        }
        Grid {
            data: out,
            nodata: self.nodata,
            use_nodata: self.use_nodata,
        }
    }

    /// Two dimensional median filter with zero padding outside the grid.
    ///
    /// The window covers `(n - 1) / 2` cells before and `n / 2` cells after
    /// the centre in each direction; even sample counts average the two
    /// middle values.
    pub fn median_filter(&self, window: Window) -> Grid {
        let (nrays, nbins) = self.dim();
        let wr = window.rays.max(1);
        let wb = window.bins.max(1);
        let before_r = (wr - 1) / 2;
        let before_b = (wb - 1) / 2;

        let mut out = Array2::zeros((nrays, nbins));
        let mut samples = Vec::with_capacity(wr * wb);
        for ray in 0..nrays {
            for bin in 0..nbins {
                samples.clear();
                for i in 0..wr {
                    for j in 0..wb {
                        let r = ray as isize + i as isize - before_r as isize;
                        let b = bin as isize + j as isize - before_b as isize;
                        if r >= 0 && r < nrays as isize && b >= 0 && b < nbins as isize {
                            samples.push(self.data[[r as usize, b as usize]]);
                        } else {
                            samples.push(0.0);
                        }
                    }
                }
                samples.sort_by(|a, b| a.total_cmp(b));
                let mid = samples.len() / 2;
                out[[ray, bin]] = if samples.len() % 2 == 0 {
                    (samples[mid - 1] + samples[mid]) / 2.0
                } else {
                    samples[mid]
                };
            }
        }
        Grid {
            data: out,
            nodata: self.nodata,
            use_nodata: self.use_nodata,
        }
    }

    /// Base-2 Shannon entropy of the distribution of distinct cell values
    pub fn entropy(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for v in self.data.iter() {
            *counts.entry(v.to_bits()).or_insert(0) += 1;
        }
        let n = self.data.len() as f64;
        counts
            .values()
            .map(|&c| {
                let p = c as f64 / n;
                -p * p.log2()
            })
            .sum()
    }

    pub fn ensure_same_dim(&self, other: &Grid, context: &str) -> PpcResult<()> {
        if self.dim() != other.dim() {
            return Err(PpcError::DimensionMismatch {
                context: context.to_string(),
                expected: self.dim(),
                found: other.dim(),
            });
        }
        Ok(())
    }

    pub fn require_nodata(&self, context: &str) -> PpcResult<()> {
        if !self.use_nodata {
            return Err(PpcError::NodataRequired(context.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Grid {
        Grid::from_rows(&[
            vec![1.0, 2.0, 3.0, 4.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![8.0, 7.0, 6.0, 5.0],
            vec![4.0, 3.0, 2.0, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_validity_follows_nodata_flag() {
        let mut grid = pattern();
        assert!(grid.is_valid(0, 0));
        grid.set_nodata(1.0);
        assert!(!grid.is_valid(0, 0));
        assert!(grid.is_valid(0, 1));
        grid.disable_nodata();
        assert!(grid.is_valid(0, 0));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = Grid::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(PpcError::InvalidArgument(_))));
    }

    #[test]
    fn test_min_skips_nodata() {
        let grid = Grid::with_nodata(pattern().into_data(), 1.0);
        assert_eq!(grid.valid_min(), Some(2.0));
        assert_eq!(grid.raw_min(), Some(1.0));
    }

    #[test]
    fn test_cumsum_along_bins() {
        let sums = pattern().cumsum_bins();
        assert_eq!(sums.to_rows()[0], vec![1.0, 3.0, 6.0, 10.0]);
        assert_eq!(sums.to_rows()[3], vec![4.0, 7.0, 9.0, 10.0]);
    }

    #[test]
    fn test_scaled_preserves_nodata() {
        let grid = Grid::with_nodata(pattern().into_data(), 8.0);
        let scaled = grid.scaled(-1.0);
        assert_eq!(scaled.get(0, 0), -1.0);
        assert_eq!(scaled.get(1, 3), 8.0);
    }

    #[test]
    fn test_median_filter_zero_padding() {
        let ones = Grid::filled(4, 4, 1.0);
        let filtered = ones.median_filter(Window::square(3));
        // corners see four cells and five padding zeros
        assert_eq!(filtered.get(0, 0), 0.0);
        assert_eq!(filtered.get(0, 1), 1.0);
        assert_eq!(filtered.get(1, 1), 1.0);
    }

    #[test]
    fn test_median_filter_even_window_averages() {
        let grid = Grid::from_rows(&[vec![1.0, 3.0]]).unwrap();
        let filtered = grid.median_filter(Window::new(1, 2));
        assert!((filtered.get(0, 0) - 2.0).abs() < 1e-12);
        assert!((filtered.get(0, 1) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_moving_std_bounded() {
        let grid = Grid::from_rows(&[vec![0.0, 0.5, 0.5, 0.0]]).unwrap();
        let std = grid.moving_std_bins(1);
        assert!((std.get(0, 0) - 0.125f64.sqrt()).abs() < 1e-9);
        assert!((std.get(0, 1) - (1.0f64 / 12.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_entropy() {
        assert_eq!(Grid::filled(2, 2, 1.0).entropy(), 0.0);
        let half = Grid::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert!((half.entropy() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_check() {
        let a = Grid::zeros(2, 3);
        let b = Grid::zeros(3, 2);
        assert!(matches!(
            a.ensure_same_dim(&b, "test"),
            Err(PpcError::DimensionMismatch { .. })
        ));
        assert!(a.ensure_same_dim(&Grid::zeros(2, 3), "test").is_ok());
    }
}

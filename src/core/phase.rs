use crate::core::grid::Grid;
use crate::core::options::RadarOptions;
use crate::core::texture::texture;
use crate::types::{PpcError, PpcResult};
use ndarray::Array2;

/// Differential phase processing parameters
#[derive(Debug, Clone)]
pub struct PhaseParams {
    /// KDP above this is discarded (deg/km)
    pub kdp_up: f64,
    /// KDP below this is discarded (deg/km)
    pub kdp_down: f64,
    /// KDP and its local standard deviation must stay below this
    pub kdp_std_threshold: f64,
    /// Smallest window in bins
    pub min_window: usize,
    /// PDP texture above this is dropped before unfolding
    pub processing_texture_threshold: f64,
    /// Filtered PDP above this triggers the short window pass (deg)
    pub threshold_phidp: f64,
    /// Nodata of the KDP grid and of dropped PDP cells
    pub nodata: f64,
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self::from(&RadarOptions::default())
    }
}

impl From<&RadarOptions> for PhaseParams {
    fn from(options: &RadarOptions) -> Self {
        Self {
            kdp_up: options.kdp_up,
            kdp_down: options.kdp_down,
            kdp_std_threshold: options.kdp_std_threshold,
            min_window: options.min_window,
            processing_texture_threshold: options.processing_texture_threshold,
            threshold_phidp: options.threshold_phidp,
            nodata: options.nodata,
        }
    }
}

/// Filtered differential phase and derived specific differential phase
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub pdp: Grid,
    pub kdp: Grid,
}

/// Iterative PDP filtering and KDP retrieval along each ray
pub struct PhaseProcessor {
    params: PhaseParams,
}

impl PhaseProcessor {
    pub fn new() -> Self {
        Self {
            params: PhaseParams::default(),
        }
    }

    pub fn with_params(params: PhaseParams) -> Self {
        Self { params }
    }

    /// Centered-difference slope over `window` bins on each side, gated by
    /// the KDP limits. Bins closer than `window` to either ray end, or whose
    /// endpoints are invalid, get zero.
    fn estimate_kdp(&self, pdp: &Grid, dr: f64, window: usize) -> Array2<f64> {
        let (nrays, nbins) = pdp.dim();
        let p = &self.params;
        let mut kdp = Array2::zeros((nrays, nbins));
        for ray in 0..nrays {
            for bin in window..nbins.saturating_sub(window) {
                let ahead = pdp.get(ray, bin + window);
                let behind = pdp.get(ray, bin - window);
                if !pdp.is_valid_value(ahead) || !pdp.is_valid_value(behind) {
                    continue;
                }
                let value = ((0.5 * (ahead - behind)) / 2.0) * dr * window as f64;
                if value < p.kdp_down || value > p.kdp_up || value > p.kdp_std_threshold {
                    continue;
                }
                kdp[[ray, bin]] = value;
            }
        }
        kdp
    }

    /// Filter `pdp` with a fixed window of `window` bins and `iterations`
    /// rounds of KDP re-integration.
    pub fn pdp_processing(
        &self,
        pdp: &Grid,
        dr: f64,
        window: usize,
        iterations: usize,
    ) -> PpcResult<PhaseResult> {
        if dr == 0.0 {
            return Err(PpcError::invalid_argument("range resolution dr must not be 0"));
        }
        log::debug!(
            "PDP processing with window {} bins, {} iterations",
            window,
            iterations
        );

        let p = &self.params;
        let nodata = p.nodata;
        let mut kdp = Grid::with_nodata(self.estimate_kdp(pdp, dr, window), nodata);

        let std = kdp.moving_std_bins(window);
        let (nrays, nbins) = kdp.dim();
        for ray in 0..nrays {
            for bin in 0..nbins {
                if std.get(ray, bin) > p.kdp_std_threshold {
                    kdp.set(ray, bin, 0.0);
                }
            }
        }

        for _ in 0..iterations {
            let mut clamped = kdp.clone();
            clamped
                .data_mut()
                .mapv_inplace(|v| if v < p.kdp_down { 0.0 } else { v });
            let mut reintegrated = clamped.scaled(2.0 * dr).cumsum_bins();
            reintegrated.disable_nodata();
            kdp = Grid::with_nodata(self.estimate_kdp(&reintegrated, dr, window), nodata);
        }

        let mut filtered = kdp.scaled(2.0 * dr).cumsum_bins();
        filtered.disable_nodata();

        Ok(PhaseResult {
            pdp: filtered,
            kdp,
        })
    }

    /// Full PDP processing: drop noisy PDP by texture, filter with the long
    /// range window `r_win1` (km) and redo with `r_win2` if the filtered
    /// phase exceeds `threshold_phidp` anywhere.
    pub fn pdp_script(
        &self,
        pdp: &Grid,
        dr: f64,
        r_win1: f64,
        r_win2: f64,
        iterations: usize,
    ) -> PpcResult<PhaseResult> {
        if dr == 0.0 {
            return Err(PpcError::invalid_argument("range resolution dr must not be 0"));
        }
        pdp.require_nodata("PDP processing")?;

        let p = &self.params;
        let window = self.window_bins(r_win1, dr);
        log::info!("PDP filtering with {} bin window", window);

        let pdp_texture = texture(pdp)?;
        let mut work = pdp.clone();
        let (nrays, nbins) = work.dim();
        let mut dropped = 0usize;
        for ray in 0..nrays {
            for bin in 0..nbins {
                let t = pdp_texture.get(ray, bin);
                if pdp_texture.is_valid_value(t) && t > p.processing_texture_threshold {
                    work.set(ray, bin, pdp.nodata());
                    dropped += 1;
                }
            }
        }
        log::debug!("Dropped {} noisy PDP cells", dropped);

        let result = self.pdp_processing(&work, dr, window, iterations)?;

        if result.pdp.any_valid_above(p.threshold_phidp) && r_win2 < r_win1 {
            let window = self.window_bins(r_win2, dr);
            log::info!("Filtered PDP exceeds {}, refiltering with {} bin window", p.threshold_phidp, window);
            return self.pdp_processing(&work, dr, window, iterations);
        }

        Ok(result)
    }

    fn window_bins(&self, range_window: f64, dr: f64) -> usize {
        let bins = (range_window / dr).round();
        let bins = if bins.is_finite() && bins > 0.0 { bins as usize } else { 0 };
        bins.max(self.params.min_window)
    }
}

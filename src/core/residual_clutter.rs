use crate::core::despeckle::Despeckler;
use crate::core::grid::{Grid, Window};
use crate::core::options::RadarOptions;
use crate::core::texture::texture;
use crate::types::PpcResult;
use ndarray::Array2;

/// Upper bound on the textured share before filtering is skipped
const MAX_TEXTURED_SHARE: f64 = 70.0;
/// Mask entropy below this means a uniform mask, nothing to filter
const MIN_MASK_ENTROPY: f64 = 5e-4;

/// Residual clutter filter parameters
#[derive(Debug, Clone)]
pub struct ResidualClutterParams {
    /// Reflectivity below this is treated as missing (dBZ)
    pub min_z_clutter_threshold: f64,
    /// Nodata of the working reflectivity grid
    pub clutter_nodata: f64,
    /// Mask value of removed cells
    pub mask_nodata: f64,
    /// Filtered reflectivity at or above this is discarded (dBZ)
    pub texture_filtering_max_z: f64,
    pub min_z_medfilter_threshold: f64,
}

impl Default for ResidualClutterParams {
    fn default() -> Self {
        Self::from(&RadarOptions::default())
    }
}

impl From<&RadarOptions> for ResidualClutterParams {
    fn from(options: &RadarOptions) -> Self {
        Self {
            min_z_clutter_threshold: options.residual_min_z_clutter_threshold,
            clutter_nodata: options.residual_clutter_nodata,
            mask_nodata: options.residual_clutter_mask_nodata,
            texture_filtering_max_z: options.residual_clutter_texture_filtering_max_z,
            min_z_medfilter_threshold: options.min_z_medfilter_threshold,
        }
    }
}

/// Detects isolated residual clutter left after the fuzzy classification
pub struct ResidualClutterDetector {
    params: ResidualClutterParams,
    despeckler: Despeckler,
}

impl ResidualClutterDetector {
    pub fn new() -> Self {
        Self::with_params(ResidualClutterParams::default())
    }

    pub fn with_params(params: ResidualClutterParams) -> Self {
        let despeckler = Despeckler::with_threshold(params.min_z_medfilter_threshold);
        Self { params, despeckler }
    }

    /// Returns a mask with 1 for echo above both `threshold_z` and the
    /// minimum clutter reflectivity, 0 for weak or missing echo and the mask nodata for cells judged residual clutter.
    pub fn detect(
        &self,
        z: &Grid,
        threshold_z: f64,
        threshold_texture: f64,
        window: Window,
    ) -> PpcResult<Grid> {
        z.require_nodata("residual clutter filter")?;
        log::info!(
            "Residual clutter filter (threshold Z {}, texture {}, window {:?})",
            threshold_z,
            threshold_texture,
            window
        );

        let p = &self.params;
        let min_z = z.valid_min().unwrap_or(p.clutter_nodata);
        let (nrays, nbins) = z.dim();

        let mut image = Array2::from_elem((nrays, nbins), p.clutter_nodata);
        let mut mask = Array2::zeros((nrays, nbins));
        for ray in 0..nrays {
            for bin in 0..nbins {
                let v = z.get(ray, bin);
                if !z.is_valid_value(v) {
                    continue;
                }
                if v < p.min_z_clutter_threshold {
                    continue;
                }
                image[[ray, bin]] = v;
                if v > threshold_z {
                    mask[[ray, bin]] = 1.0;
                }
            }
        }
        let image = Grid::with_nodata(image, p.clutter_nodata);
        let mut mask = Grid::with_nodata(mask, p.mask_nodata);

        let textured = texture(&image)?
            .data()
            .iter()
            .filter(|&&t| t > threshold_z)
            .count();
        let textured_share = textured as f64 / (image.len().max(1) as f64 * 100.0);
        let entropy = mask.entropy();
        log::debug!(
            "Residual clutter textured share {:.6}, mask entropy {:.6}",
            textured_share,
            entropy
        );

        if textured_share > MAX_TEXTURED_SHARE || entropy <= MIN_MASK_ENTROPY {
            return Ok(mask);
        }

        let mut filtered = self.despeckler.medfilt(&image, threshold_z, window)?;
        let filtered_texture = texture(&filtered)?;
        for ray in 0..nrays {
            for bin in 0..nbins {
                let t = filtered_texture.get(ray, bin);
                if filtered_texture.is_valid_value(t) && t >= threshold_texture {
                    filtered.set(ray, bin, min_z);
                }
                if filtered.get(ray, bin) >= p.texture_filtering_max_z {
                    filtered.set(ray, bin, min_z);
                }
            }
        }

        let median = self.despeckler.medfilt(&filtered, threshold_z, window)?;
        let mut removed = 0usize;
        for ray in 0..nrays {
            for bin in 0..nbins {
                let mut v = median.get(ray, bin);
                if v <= threshold_z {
                    v = min_z;
                }
                if v <= p.min_z_clutter_threshold {
                    mask.set(ray, bin, p.mask_nodata);
                    removed += 1;
                }
            }
        }
        log::debug!("Residual clutter filter flagged {} cells", removed);

        Ok(mask)
    }
}

use crate::core::grid::Grid;
use crate::types::PpcResult;

/// Z-PHI corrected reflectivity and specific attenuation
#[derive(Debug, Clone)]
pub struct ZphiResult {
    pub z: Grid,
    /// Specific attenuation (dB/km)
    pub ah: Grid,
}

/// Self-consistent Z-PHI attenuation correction
pub struct ZphiCorrector;

impl ZphiCorrector {
    pub fn new() -> Self {
        Self
    }

    /// Correct `z` per ray using the PDP increase over the eligible segment
    /// given by `mask`. `dr` is the bin length in km and `bb` the Z-A
    /// exponent; `gamma_h` relates PDP to attenuation.
    pub fn correct(
        &self,
        z: &Grid,
        pdp: &Grid,
        mask: &Grid,
        dr: f64,
        bb: f64,
        gamma_h: f64,
    ) -> PpcResult<ZphiResult> {
        z.require_nodata("zphi Z")?;
        pdp.require_nodata("zphi PDP")?;
        z.ensure_same_dim(pdp, "zphi PDP")?;
        z.ensure_same_dim(mask, "zphi mask")?;
        log::info!("Z-PHI correction (BB {}, gamma_h {})", bb, gamma_h);

        let (nrays, nbins) = z.dim();
        // Cells outside the corrected segment keep their input value
        let mut corrected = z.clone();
        let mut ah = Grid::zeros(nrays, nbins);
        ah.set_nodata(z.nodata());

        let linear = |v: f64| 10f64.powf(0.1 * v).powf(bb);

        for ray in 0..nrays {
            let eligible = |bin: usize| mask.get(ray, bin) > 0.0;
            let start = match (0..nbins).find(|&bin| eligible(bin)) {
                Some(bin) => bin,
                None => continue,
            };
            let end = (start..nbins).rev().find(|&bin| eligible(bin)).unwrap_or(start);

            let first = pdp.get(ray, start);
            let last = pdp.get(ray, end);
            let delta_pdp = if pdp.is_valid_value(first) && pdp.is_valid_value(last) && last > 0.0 {
                last - first
            } else {
                0.0
            };
            let factor = 10f64.powf(0.1 * bb * gamma_h * delta_pdp) - 1.0;

            let integral: f64 = (start..=end)
                .map(|bin| z.get(ray, bin))
                .filter(|&v| z.is_valid_value(v))
                .map(linear)
                .sum();

            let mut cumulative = 0.0;
            let mut correction = 0.0;
            for bin in start..=end {
                let v = z.get(ray, bin);
                if !z.is_valid_value(v) {
                    continue;
                }
                let lin = linear(v);
                cumulative += lin;
                let denominator =
                    0.46 * bb * dr * (integral + factor * integral - factor * cumulative);
                if denominator != 0.0 {
                    let a = factor * lin / denominator;
                    ah.set(ray, bin, a);
                    correction += 2.0 * dr * a;
                    corrected.set(ray, bin, v + correction);
                }
            }

            for bin in end..nbins {
                let v = z.get(ray, bin);
                if z.is_valid_value(v) {
                    corrected.set(ray, bin, v + correction);
                }
            }
        }

        Ok(ZphiResult { z: corrected, ah })
    }
}

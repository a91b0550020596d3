use crate::core::grid::Grid;
use crate::core::options::RadarOptions;
use crate::types::PpcResult;

/// Inputs of the KDP based attenuation correction
#[derive(Debug, Clone, Copy)]
pub struct AttenuationInputs<'a> {
    pub z: &'a Grid,
    pub zdr: &'a Grid,
    /// Optional second reflectivity channel corrected alongside `z`
    pub dbzh: Option<&'a Grid>,
    /// Filtered differential phase, must use nodata
    pub pdp: &'a Grid,
    /// Cells > 0 are eligible for attenuation estimation
    pub mask: &'a Grid,
}

/// Attenuation corrected fields
#[derive(Debug, Clone)]
pub struct AttenuationResult {
    pub z: Grid,
    pub zdr: Grid,
    pub dbzh: Option<Grid>,
    /// Path integrated attenuation (dB)
    pub pia: Grid,
}

/// Linear PDP based attenuation correction
pub struct AttenuationCorrector {
    /// PIA is discarded where the corrected reflectivity is below this (dBZ)
    pia_min_z: f64,
}

impl AttenuationCorrector {
    pub fn new() -> Self {
        Self::with_pia_min_z(RadarOptions::default().attenuation_pia_min_z)
    }

    pub fn with_pia_min_z(pia_min_z: f64) -> Self {
        Self { pia_min_z }
    }

    /// PIA grows as `gamma_h` times the PDP increase from the first to the
    /// last eligible bin of each ray and stays constant beyond it. Z and DBZH
    /// are raised by PIA, ZDR by `alpha` times PIA.
    pub fn correct(
        &self,
        inputs: &AttenuationInputs,
        gamma_h: f64,
        alpha: f64,
    ) -> PpcResult<AttenuationResult> {
        let pdp = inputs.pdp;
        pdp.require_nodata("attenuation PDP")?;
        pdp.ensure_same_dim(inputs.z, "attenuation Z")?;
        pdp.ensure_same_dim(inputs.zdr, "attenuation ZDR")?;
        pdp.ensure_same_dim(inputs.mask, "attenuation mask")?;
        if let Some(dbzh) = inputs.dbzh {
            pdp.ensure_same_dim(dbzh, "attenuation DBZH")?;
        }
        log::info!("Attenuation correction (gamma_h {}, alpha {})", gamma_h, alpha);

        let (nrays, nbins) = pdp.dim();
        let mut pia = Grid::zeros(nrays, nbins);
        pia.set_nodata(pdp.nodata());

        for ray in 0..nrays {
            let eligible = |bin: usize| inputs.mask.get(ray, bin) > 0.0;
            let start = match (0..nbins).find(|&bin| eligible(bin)) {
                Some(bin) => bin,
                None => continue,
            };
            let end = match (start + 1..nbins).rev().find(|&bin| eligible(bin)) {
                Some(bin) if bin < nbins - 1 => bin,
                _ => continue,
            };

            let first = pdp.get(ray, start);
            if !pdp.is_valid_value(first) {
                continue;
            }
            let mut last = 0.0;
            for bin in start..=end {
                let v = pdp.get(ray, bin);
                if pdp.is_valid_value(v) {
                    last = gamma_h * (v - first);
                }
                pia.set(ray, bin, last);
            }
            for bin in end + 1..nbins {
                pia.set(ray, bin, last);
            }
        }

        let mut z = inputs.z.clone();
        let mut zdr = inputs.zdr.clone();
        let mut dbzh = inputs.dbzh.cloned();
        for ray in 0..nrays {
            for bin in 0..nbins {
                let a = pia.get(ray, bin);
                if !pia.is_valid_value(a) || a < 0.0 {
                    continue;
                }
                add_if_valid(&mut z, ray, bin, a);
                add_if_valid(&mut zdr, ray, bin, alpha * a);
                if let Some(dbzh) = dbzh.as_mut() {
                    add_if_valid(dbzh, ray, bin, a);
                }
            }
        }

        let nodata = pia.nodata();
        for ray in 0..nrays {
            for bin in 0..nbins {
                if z.get(ray, bin) < self.pia_min_z {
                    pia.set(ray, bin, nodata);
                }
            }
        }

        Ok(AttenuationResult { z, zdr, dbzh, pia })
    }
}

fn add_if_valid(grid: &mut Grid, ray: usize, bin: usize, delta: f64) {
    if grid.is_valid(ray, bin) {
        let v = grid.get(ray, bin);
        grid.set(ray, bin, v + delta);
    }
}

use crate::core::attenuation::{AttenuationCorrector, AttenuationInputs, AttenuationResult};
use crate::core::clutter::{ClutterCorrector, ClutterInputs, ClutterParams};
use crate::core::grid::{Grid, Window};
use crate::core::options::{RadarOptions, RequestedFields};
use crate::core::phase::{PhaseParams, PhaseProcessor, PhaseResult};
use crate::core::residual_clutter::{ResidualClutterDetector, ResidualClutterParams};
use crate::core::scan::{PolarScan, PolarVolume};
use crate::core::texture::texture;
use crate::core::zphi::{ZphiCorrector, ZphiResult};
use crate::io::melting_layer::{apply_melting_layer, MeltingLayerProvider};
use crate::io::options_loader::OptionsRepository;
use crate::types::{
    quantity, ProcessedScan, PpcResult, QUALITY_ATTENUATION, QUALITY_ATTENUATION_MASK,
    QUALITY_RESIDUAL_CLUTTER_MASK,
};

/// Outputs depending on the residual clutter filter
const NEEDS_RESIDUAL: RequestedFields = RequestedFields::from_bits(
    RequestedFields::ALL.bits() & !RequestedFields::KDP_CORR.bits(),
);

/// Outputs depending on PDP filtering
const NEEDS_PHASE: RequestedFields = RequestedFields::KDP_CORR
    .union(RequestedFields::PHIDP_CORR)
    .union(NEEDS_ATTENUATION_MASK);

/// Outputs depending on the attenuation eligibility mask
const NEEDS_ATTENUATION_MASK: RequestedFields = NEEDS_ATTENUATION
    .union(RequestedFields::ZPHI_CORR)
    .union(RequestedFields::QUALITY_ATTENUATION_MASK);

/// Outputs depending on the PIA correction
const NEEDS_ATTENUATION: RequestedFields = RequestedFields::ATT_TH_CORR
    .union(RequestedFields::ATT_DBZH_CORR)
    .union(RequestedFields::ZDR_CORR)
    .union(RequestedFields::QUALITY_ATTENUATION);

/// Polarimetric quality control of polar scans
pub struct PdpProcessor {
    options: RadarOptions,
}

impl PdpProcessor {
    /// Processor with the backup default options
    pub fn new() -> Self {
        Self {
            options: RadarOptions::default(),
        }
    }

    pub fn with_options(options: RadarOptions) -> Self {
        Self { options }
    }

    /// Processor configured for a radar node. The melting layer height is
    /// taken from `provider` when it has a recent observation.
    pub fn for_radar(
        repository: &OptionsRepository,
        node: &str,
        provider: Option<&dyn MeltingLayerProvider>,
    ) -> Self {
        let mut options = repository.options_for_radar(node);
        if let Some(provider) = provider {
            apply_melting_layer(&mut options, node, provider);
        }
        Self::with_options(options)
    }

    pub fn options(&self) -> &RadarOptions {
        &self.options
    }

    /// Run the stages needed for the requested fields on one scan.
    ///
    /// Outputs whose inputs are missing from the scan are skipped with a
    /// warning; a scan without reflectivity yields an empty result.
    pub fn process(&self, scan: &PolarScan) -> PpcResult<ProcessedScan> {
        let start_time = std::time::Instant::now();
        let o = &self.options;
        let fields = o.requested_fields;
        let mut result = ProcessedScan::default();

        log::info!(
            "Processing {} scan {}x{} at {:.2} deg, requested {}",
            scan.source,
            scan.nrays,
            scan.nbins,
            scan.elangle.to_degrees(),
            fields
        );
        if fields.is_empty() {
            return Ok(result);
        }

        // TH is the primary reflectivity; DBZH stands in when TH is absent
        let (z_param, primary_is_th) = match (scan.parameter(quantity::TH), scan.parameter(quantity::DBZH)) {
            (Some(th), _) => (th, true),
            (None, Some(dbzh)) => (dbzh, false),
            (None, None) => {
                log::warn!("Scan from {} has neither TH nor DBZH, nothing to do", scan.source);
                return Ok(result);
            }
        };

        let nodata = o.nodata;
        let (nrays, nbins) = (scan.nrays, scan.nbins);
        let load = |name: &str| scan.parameter(name).map(|p| p.to_grid(nodata));
        let missing = || Grid::with_nodata(Grid::filled(nrays, nbins, nodata).into_data(), nodata);

        let mut m = Moments {
            z: z_param.to_grid(nodata),
            undetect_z: z_param.undetect_value(),
            dbzh: if primary_is_th {
                scan.parameter(quantity::DBZH)
                    .map(|p| (p.to_grid(nodata), p.undetect_value()))
            } else {
                None
            },
            zdr: load(quantity::ZDR),
            rhohv: load(quantity::RHOHV),
            pdp: load(quantity::PHIDP).map(|g| if o.invert_phidp { g.scaled(-1.0) } else { g }),
        };
        let vradh = load(quantity::VRADH);

        // Drop weak echo
        for ray in 0..nrays {
            for bin in 0..nbins {
                if m.z.get(ray, bin) < o.preprocess_z_threshold {
                    m.drop_cell(ray, bin, nodata);
                }
            }
        }

        let texture_pdp = match &m.pdp {
            Some(pdp) => texture(pdp)?,
            None => missing(),
        };
        let texture_z = texture(&m.z)?;
        let vradh_input = vradh.unwrap_or_else(missing);
        let rhohv_input = match &m.rhohv {
            Some(g) => g.clone(),
            None => missing(),
        };
        let clutter_map = load(quantity::CLUTTER_MAP).unwrap_or_else(|| Grid::zeros(nrays, nbins));

        let clutter = ClutterCorrector::with_params(ClutterParams::from(o)).correct(
            &ClutterInputs {
                z: &m.z,
                vradh: &vradh_input,
                texture_phidp: &texture_pdp,
                rhohv: &rhohv_input,
                texture_z: &texture_z,
                clutter_map: &clutter_map,
            },
            nodata,
            nodata,
            o.quality_threshold,
        )?;

        for ray in 0..nrays {
            for bin in 0..nbins {
                if clutter.quality.get(ray, bin) < o.quality_threshold {
                    m.clear_cell(ray, bin, nodata, true);
                }
            }
        }

        let residual = if fields.intersects(NEEDS_RESIDUAL) {
            let detector = ResidualClutterDetector::with_params(ResidualClutterParams::from(o));
            let window = Window::new(o.residual_filter_ray_size, o.residual_filter_bin_size);
            Some(detector.detect(&m.z, o.residual_threshold_z, o.residual_threshold_texture, window)?)
        } else {
            None
        };

        let phase: Option<PhaseResult> = match (&m.pdp, fields.intersects(NEEDS_PHASE)) {
            (Some(pdp), true) => Some(PhaseProcessor::with_params(PhaseParams::from(o)).pdp_script(
                pdp,
                scan.rscale_km(),
                o.pdp_r_win1,
                o.pdp_r_win2,
                o.pdp_nr_iterations,
            )?),
            (None, true) => {
                log::warn!("Scan from {} lacks PHIDP, skipping phase dependent outputs", scan.source);
                None
            }
            _ => None,
        };

        if let Some(mask) = &residual {
            m.apply_residual_mask(mask, o.residual_clutter_mask_nodata, nodata);
        }

        let filtered_pdp = phase
            .as_ref()
            .map(|phase| blank_pdp(&phase.pdp, &m.z, o.quality_threshold, nodata));

        let attenuation_mask = match (&phase, &m.rhohv, fields.intersects(NEEDS_ATTENUATION_MASK)) {
            (Some(phase), Some(rhohv), true) => Some(self.attenuation_mask(scan, &m.z, rhohv, &phase.kdp)),
            (Some(_), None, true) => {
                log::warn!("Scan from {} lacks RHOHV, skipping attenuation outputs", scan.source);
                None
            }
            _ => None,
        };

        let attenuation: Option<AttenuationResult> =
            match (&attenuation_mask, &filtered_pdp, fields.intersects(NEEDS_ATTENUATION)) {
                (Some(mask), Some(pdp), true) => {
                    let zdr_input = match &m.zdr {
                        Some(g) => g.clone(),
                        None => missing(),
                    };
                    let inputs = AttenuationInputs {
                        z: &m.z,
                        zdr: &zdr_input,
                        dbzh: m.dbzh.as_ref().map(|(g, _)| g),
                        pdp,
                        mask,
                    };
                    Some(
                        AttenuationCorrector::with_pia_min_z(o.attenuation_pia_min_z).correct(
                            &inputs,
                            o.attenuation_gamma_h,
                            o.attenuation_alpha,
                        )?,
                    )
                }
                _ => None,
            };

        let zphi: Option<ZphiResult> =
            match (&attenuation_mask, &filtered_pdp, fields.contains(RequestedFields::ZPHI_CORR)) {
                (Some(mask), Some(pdp), true) => Some(ZphiCorrector::new().correct(
                    &m.z,
                    pdp,
                    mask,
                    scan.rscale_km(),
                    o.bb,
                    o.attenuation_gamma_h,
                )?),
                _ => None,
            };

        let quality = residual
            .as_ref()
            .map(|mask| merge_quality(mask, &clutter.mask));

        let dbzh = m.dbzh.map(|(g, _)| g);
        let (th_out, dbzh_out) = if primary_is_th {
            (Some(m.z.clone()), dbzh)
        } else {
            (None, Some(m.z.clone()))
        };
        let (att_th, att_dbzh) = match attenuation.as_ref() {
            Some(att) if primary_is_th => (Some(att.z.clone()), att.dbzh.clone()),
            Some(att) => (None, Some(att.z.clone())),
            None => (None, None),
        };

        let mut emit = |flag: RequestedFields, name: &str, grid: Option<Grid>, quality_field: bool| {
            if !fields.contains(flag) {
                return;
            }
            match grid {
                Some(grid) if quality_field => {
                    result.quality_fields.insert(name.to_string(), grid);
                }
                Some(grid) => {
                    result.parameters.insert(name.to_string(), grid);
                }
                None => log::warn!("Cannot produce {} for scan from {}, inputs missing", name, scan.source),
            }
        };

        emit(RequestedFields::TH_CORR, quantity::CORR_TH, th_out, false);
        emit(RequestedFields::ATT_TH_CORR, quantity::CORR_ATT_TH, att_th, false);
        emit(RequestedFields::DBZH_CORR, quantity::CORR_DBZH, dbzh_out, false);
        emit(RequestedFields::ATT_DBZH_CORR, quantity::CORR_ATT_DBZH, att_dbzh, false);
        emit(RequestedFields::KDP_CORR, quantity::CORR_KDP, phase.map(|p| p.kdp), false);
        emit(RequestedFields::RHOHV_CORR, quantity::CORR_RHOHV, m.rhohv, false);
        emit(RequestedFields::PHIDP_CORR, quantity::CORR_PHIDP, filtered_pdp, false);
        emit(
            RequestedFields::ZDR_CORR,
            quantity::CORR_ZDR,
            m.zdr.and(attenuation.as_ref().map(|a| a.zdr.clone())),
            false,
        );
        emit(RequestedFields::ZPHI_CORR, quantity::CORR_ZPHI, zphi.map(|r| r.z), false);
        emit(RequestedFields::QUALITY_RESIDUAL_CLUTTER_MASK, QUALITY_RESIDUAL_CLUTTER_MASK, quality, true);
        emit(RequestedFields::QUALITY_ATTENUATION_MASK, QUALITY_ATTENUATION_MASK, attenuation_mask, true);
        emit(RequestedFields::QUALITY_ATTENUATION, QUALITY_ATTENUATION, attenuation.map(|a| a.pia), true);

        log::info!(
            "Processed scan from {} in {:?}: {} parameters, {} quality fields",
            scan.source,
            start_time.elapsed(),
            result.parameters.len(),
            result.quality_fields.len()
        );
        Ok(result)
    }

    /// Cells below the melting layer with rain-like RHOHV, KDP and
    /// reflectivity are eligible for attenuation correction
    fn attenuation_mask(&self, scan: &PolarScan, z: &Grid, rhohv: &Grid, kdp: &Grid) -> Grid {
        let o = &self.options;
        let (nrays, nbins) = z.dim();
        let mut mask = Grid::zeros(nrays, nbins);
        for bin in 0..nbins {
            if scan.bin_height_km(bin) >= o.melting_layer_bottom_height {
                continue;
            }
            for ray in 0..nrays {
                if rhohv.get(ray, bin) > o.min_attenuation_mask_rhohv
                    && kdp.get(ray, bin) > o.min_attenuation_mask_kdp
                    && z.get(ray, bin) > o.min_attenuation_mask_th
                {
                    mask.set(ray, bin, 1.0);
                }
            }
        }
        mask
    }

    /// Process every scan of a volume independently. Scans that fail are
    /// logged and left out; the returned pairs carry the scan index.
    pub fn process_volume(&self, volume: &PolarVolume) -> Vec<(usize, ProcessedScan)> {
        log::info!("Processing volume from {} with {} scans", volume.source, volume.scans.len());

        #[cfg(feature = "parallel")]
        let results: Vec<(usize, PpcResult<ProcessedScan>)> = {
            use rayon::prelude::*;
            volume
                .scans
                .par_iter()
                .enumerate()
                .map(|(index, scan)| (index, self.process(scan)))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(usize, PpcResult<ProcessedScan>)> = volume
            .scans
            .iter()
            .enumerate()
            .map(|(index, scan)| (index, self.process(scan)))
            .collect();

        results
            .into_iter()
            .filter_map(|(index, result)| match result {
                Ok(processed) => Some((index, processed)),
                Err(e) => {
                    log::warn!("Failed to process scan {} of {}: {}", index, volume.source, e);
                    None
                }
            })
            .collect()
    }
}

/// Working copies of the scan moments in physical units
struct Moments {
    z: Grid,
    /// Physical undetect value of the primary reflectivity
    undetect_z: f64,
    /// Secondary DBZH channel with its undetect value
    dbzh: Option<(Grid, f64)>,
    zdr: Option<Grid>,
    rhohv: Option<Grid>,
    pdp: Option<Grid>,
}

impl Moments {
    /// Every moment of the cell becomes nodata
    fn drop_cell(&mut self, ray: usize, bin: usize, nodata: f64) {
        self.z.set(ray, bin, nodata);
        set_cell(self.dbzh.as_mut().map(|(g, _)| g), ray, bin, nodata);
        set_cell(self.zdr.as_mut(), ray, bin, nodata);
        set_cell(self.pdp.as_mut(), ray, bin, nodata);
        set_cell(self.rhohv.as_mut(), ray, bin, nodata);
    }

    /// Reflectivity becomes undetect, ZDR and RHOHV nodata; PDP only if
    /// `clear_pdp`
    fn clear_cell(&mut self, ray: usize, bin: usize, nodata: f64, clear_pdp: bool) {
        self.z.set(ray, bin, self.undetect_z);
        if let Some((g, undetect)) = self.dbzh.as_mut() {
            g.set(ray, bin, *undetect);
        }
        set_cell(self.zdr.as_mut(), ray, bin, nodata);
        set_cell(self.rhohv.as_mut(), ray, bin, nodata);
        if clear_pdp {
            set_cell(self.pdp.as_mut(), ray, bin, nodata);
        }
    }

    /// Clear cells the residual clutter filter did not keep as echo
    fn apply_residual_mask(&mut self, mask: &Grid, mask_nodata: f64, nodata: f64) {
        let (nrays, nbins) = mask.dim();
        for ray in 0..nrays {
            for bin in 0..nbins {
                let v = mask.get(ray, bin);
                if v == 0.0 || v == mask_nodata {
                    self.clear_cell(ray, bin, nodata, false);
                }
            }
        }
    }
}

/// PDP is kept only under valid reflectivity of at least `threshold`
fn blank_pdp(pdp: &Grid, z: &Grid, threshold: f64, nodata: f64) -> Grid {
    let mut out = pdp.clone();
    out.set_nodata(nodata);
    let (nrays, nbins) = z.dim();
    for ray in 0..nrays {
        for bin in 0..nbins {
            let v = z.get(ray, bin);
            if !z.is_valid_value(v) || v < threshold {
                out.set(ray, bin, nodata);
            }
        }
    }
    out
}

/// 1 where the residual filter kept the cell and the clutter corrector
/// did not remove it, else 0
fn merge_quality(residual: &Grid, clutter_mask: &Grid) -> Grid {
    let (nrays, nbins) = residual.dim();
    let mut merged = Grid::zeros(nrays, nbins);
    for ray in 0..nrays {
        for bin in 0..nbins {
            if residual.get(ray, bin) == 1.0 && clutter_mask.get(ray, bin) == 0.0 {
                merged.set(ray, bin, 1.0);
            }
        }
    }
    merged
}

fn set_cell(grid: Option<&mut Grid>, ray: usize, bin: usize, value: f64) {
    if let Some(grid) = grid {
        grid.set(ray, bin, value);
    }
}

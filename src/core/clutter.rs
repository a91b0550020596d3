use crate::core::fuzzy::MembershipParams;
use crate::core::grid::Grid;
use crate::core::options::RadarOptions;
use crate::types::{PpcError, PpcResult};
use ndarray::Array2;

/// The six classifier inputs, all of one shape
#[derive(Debug, Clone, Copy)]
pub struct ClutterInputs<'a> {
    pub z: &'a Grid,
    pub vradh: &'a Grid,
    pub texture_phidp: &'a Grid,
    pub rhohv: &'a Grid,
    pub texture_z: &'a Grid,
    pub clutter_map: &'a Grid,
}

impl<'a> ClutterInputs<'a> {
    fn ensure_same_dim(&self) -> PpcResult<()> {
        self.z.ensure_same_dim(self.vradh, "clutter VRADH")?;
        self.z.ensure_same_dim(self.texture_phidp, "clutter PHIDP texture")?;
        self.z.ensure_same_dim(self.rhohv, "clutter RHOHV")?;
        self.z.ensure_same_dim(self.texture_z, "clutter Z texture")?;
        self.z.ensure_same_dim(self.clutter_map, "clutter map")?;
        Ok(())
    }
}

/// Clutter classification parameters
#[derive(Debug, Clone)]
pub struct ClutterParams {
    pub uz: MembershipParams,
    pub vel: MembershipParams,
    pub text_phidp: MembershipParams,
    pub rhv: MembershipParams,
    pub text_uz: MembershipParams,
    pub clutter_map: MembershipParams,
    /// Reflectivity below this is never removed (dBZ)
    pub min_dbz: f64,
}

impl Default for ClutterParams {
    fn default() -> Self {
        Self::from(&RadarOptions::default())
    }
}

impl From<&RadarOptions> for ClutterParams {
    fn from(options: &RadarOptions) -> Self {
        Self {
            uz: options.parameters_uz,
            vel: options.parameters_vel,
            text_phidp: options.parameters_text_phidp,
            rhv: options.parameters_rhv,
            text_uz: options.parameters_text_uz,
            clutter_map: options.parameters_clutter_map,
            min_dbz: options.min_dbz,
        }
    }
}

/// Fuzzy logic clutter classifier
pub struct ClutterClassifier {
    params: ClutterParams,
}

impl ClutterClassifier {
    pub fn new() -> Self {
        Self {
            params: ClutterParams::default(),
        }
    }

    pub fn with_params(params: ClutterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClutterParams {
        &self.params
    }

    /// Weighted mean of the six membership degrees per cell.
    ///
    /// Cells where Z equals `nodata_z` get degree 0. Velocity cells equal to
    /// `nodata_vradh` contribute no velocity membership.
    pub fn classify(
        &self,
        inputs: &ClutterInputs,
        nodata_z: f64,
        nodata_vradh: f64,
    ) -> PpcResult<Grid> {
        inputs.ensure_same_dim()?;

        let p = &self.params;
        let weight_sum = p.uz.weight
            + p.vel.weight
            + p.text_phidp.weight
            + p.rhv.weight
            + p.text_uz.weight
            + p.clutter_map.weight;
        if weight_sum == 0.0 {
            return Err(PpcError::invalid_argument(
                "clutter membership weights sum to zero",
            ));
        }
        log::debug!("Clutter classification with weight sum {}", weight_sum);

        let (nrays, nbins) = inputs.z.dim();
        let mut degree = Array2::zeros((nrays, nbins));
        for ray in 0..nrays {
            for bin in 0..nbins {
                let z = inputs.z.get(ray, bin);
                if z == nodata_z {
                    continue;
                }
                let vradh = inputs.vradh.get(ray, bin);
                let vel = if vradh == nodata_vradh {
                    0.0
                } else {
                    p.vel.value(vradh)
                };
                let sum = p.uz.weight * p.uz.value(z)
                    + p.vel.weight * vel
                    + p.text_phidp.weight * p.text_phidp.value(inputs.texture_phidp.get(ray, bin))
                    + p.rhv.weight * p.rhv.value(inputs.rhohv.get(ray, bin))
                    + p.text_uz.weight * p.text_uz.value(inputs.texture_z.get(ray, bin))
                    + p.clutter_map.weight * p.clutter_map.value(inputs.clutter_map.get(ray, bin));
                degree[[ray, bin]] = sum / weight_sum;
            }
        }

        Ok(Grid::new(degree))
    }
}

/// Output of the clutter corrector
#[derive(Debug, Clone)]
pub struct ClutterCorrection {
    /// Reflectivity with clutter cells set to the Z nodata
    pub z: Grid,
    /// Per-cell quality, one minus the clutter degree
    pub quality: Grid,
    /// 1 where the cell was removed as clutter, else 0
    pub mask: Grid,
}

/// Removes reflectivity classified as clutter
pub struct ClutterCorrector {
    classifier: ClutterClassifier,
}

impl ClutterCorrector {
    pub fn new() -> Self {
        Self {
            classifier: ClutterClassifier::new(),
        }
    }

    pub fn with_params(params: ClutterParams) -> Self {
        Self {
            classifier: ClutterClassifier::with_params(params),
        }
    }

    pub fn correct(
        &self,
        inputs: &ClutterInputs,
        nodata_z: f64,
        nodata_vradh: f64,
        quality_threshold: f64,
    ) -> PpcResult<ClutterCorrection> {
        log::info!("Applying clutter correction (quality threshold {})", quality_threshold);

        let degree = self.classifier.classify(inputs, nodata_z, nodata_vradh)?;
        let quality = degree.map_valid(|d| 1.0 - d);
        let min_dbz = self.classifier.params().min_dbz;

        let mut z = inputs.z.clone();
        let (nrays, nbins) = z.dim();
        let mut mask = Grid::zeros(nrays, nbins);
        let mut removed = 0usize;
        for ray in 0..nrays {
            for bin in 0..nbins {
                let v = z.get(ray, bin);
                if v >= min_dbz && v != nodata_z && quality.get(ray, bin) < quality_threshold {
                    z.set(ray, bin, nodata_z);
                    mask.set(ray, bin, 1.0);
                    removed += 1;
                }
            }
        }
        log::debug!("Clutter correction removed {} of {} cells", removed, nrays * nbins);

        Ok(ClutterCorrection { z, quality, mask })
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

    fn with_sentinel(grid: Grid) -> Grid {
        Grid::with_nodata(grid.into_data(), -9999.0)
    }

    fn assert_rows(grid: &Grid, expected: &[[f64; 4]; 4]) {
        for (ray, row) in expected.iter().enumerate() {
            for (bin, value) in row.iter().enumerate() {
                assert!(
                    (grid.get(ray, bin) - value).abs() < 1e-3,
                    "[{}, {}] = {} expected {}",
                    ray,
                    bin,
                    grid.get(ray, bin),
                    value
                );
            }
        }
    }

    #[test]
    fn test_clutter_id() {
        let g = with_sentinel(pattern());
        let inputs = ClutterInputs {
            z: &g,
            vradh: &g,
            texture_phidp: &g,
            rhohv: &g,
            texture_z: &g,
            clutter_map: &g,
        };
        let degree = ClutterClassifier::new().classify(&inputs, -9999.0, -9999.0).unwrap();
        assert_rows(
            &degree,
            &[
                [0.328, 0.306, 0.324, 0.342],
                [0.36, 0.36, 0.36, 0.36],
                [0.36, 0.36, 0.36, 0.36],
                [0.342, 0.324, 0.306, 0.328],
            ],
        );
    }

    #[test]
    fn test_clutter_id_z_nodata_gives_zero() {
        let mut z = pattern();
        z.set(1, 1, -9999.0);
        let g = pattern();
        let inputs = ClutterInputs {
            z: &z,
            vradh: &g,
            texture_phidp: &g,
            rhohv: &g,
            texture_z: &g,
            clutter_map: &g,
        };
        let degree = ClutterClassifier::new().classify(&inputs, -9999.0, -9999.0).unwrap();
        assert_eq!(degree.get(1, 1), 0.0);
        assert!((degree.get(1, 2) - 0.36).abs() < 1e-3);
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut params = ClutterParams::default();
        for p in [
            &mut params.uz,
            &mut params.vel,
            &mut params.text_phidp,
            &mut params.rhv,
            &mut params.text_uz,
            &mut params.clutter_map,
        ] {
            p.weight = 0.0;
        }
        let g = pattern();
        let inputs = ClutterInputs {
            z: &g,
            vradh: &g,
            texture_phidp: &g,
            rhohv: &g,
            texture_z: &g,
            clutter_map: &g,
        };
        let result = ClutterClassifier::with_params(params).classify(&inputs, -9999.0, -9999.0);
        assert!(matches!(result, Err(PpcError::InvalidArgument(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let g = pattern();
        let small = Grid::zeros(2, 2);
        let inputs = ClutterInputs {
            z: &g,
            vradh: &g,
            texture_phidp: &small,
            rhohv: &g,
            texture_z: &g,
            clutter_map: &g,
        };
        let result = ClutterClassifier::new().classify(&inputs, -9999.0, -9999.0);
        assert!(matches!(result, Err(PpcError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_clutter_correction() {
        let mut z = with_sentinel(pattern());
        z.set(0, 3, -33.0);
        let g = with_sentinel(pattern());
        let inputs = ClutterInputs {
            z: &z,
            vradh: &g,
            texture_phidp: &g,
            rhohv: &g,
            texture_z: &g,
            clutter_map: &g,
        };
        let result = ClutterCorrector::new()
            .correct(&inputs, -9999.0, -9999.0, 0.65)
            .unwrap();

        assert_rows(
            &result.z,
            &[
                [1.0, 2.0, 3.0, -33.0],
                [-9999.0, -9999.0, -9999.0, -9999.0],
                [-9999.0, -9999.0, -9999.0, -9999.0],
                [4.0, 3.0, 2.0, 1.0],
            ],
        );
        assert_rows(
            &result.quality,
            &[
                [0.672, 0.694, 0.676, 0.658],
                [0.64, 0.64, 0.64, 0.64],
                [0.64, 0.64, 0.64, 0.64],
                [0.658, 0.676, 0.694, 0.672],
            ],
        );
        assert_rows(
            &result.mask,
            &[
                [0.0, 0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0, 1.0],
                [1.0, 1.0, 1.0, 1.0],
                [0.0, 0.0, 0.0, 0.0],
            ],
        );
    }

    #[test]
    fn test_clutter_correction_keeps_removed_cells() {
        let g = with_sentinel(pattern());
        let inputs = ClutterInputs {
            z: &g,
            vradh: &g,
            texture_phidp: &g,
            rhohv: &g,
            texture_z: &g,
            clutter_map: &g,
        };
        let corrector = ClutterCorrector::new();
        let first = corrector.correct(&inputs, -9999.0, -9999.0, 0.65).unwrap();

        let again = ClutterInputs { z: &first.z, ..inputs };
        let second = corrector.correct(&again, -9999.0, -9999.0, 0.65).unwrap();
        for ray in 0..4 {
            for bin in 0..4 {
                if first.z.get(ray, bin) == -9999.0 {
                    assert_eq!(second.z.get(ray, bin), -9999.0);
                }
            }
        }
    }
}

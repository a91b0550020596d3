use crate::core::grid::Grid;
use crate::types::{PpcError, PpcResult};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Mean earth radius (m)
const EARTH_RADIUS: f64 = 6_371_000.0;
/// Effective earth radius factor for standard refraction
const EFFECTIVE_RADIUS_FACTOR: f64 = 4.0 / 3.0;

/// One stored moment of a scan: raw values with their scaling
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParameter {
    /// Raw values indexed `[ray, bin]`
    pub data: Array2<f64>,
    pub gain: f64,
    pub offset: f64,
    /// Raw value of cells without data
    pub nodata: f64,
    /// Raw value of cells scanned without detection
    pub undetect: f64,
}

impl ScanParameter {
    pub fn new(data: Array2<f64>, gain: f64, offset: f64, nodata: f64, undetect: f64) -> Self {
        Self {
            data,
            gain,
            offset,
            nodata,
            undetect,
        }
    }

    /// A parameter already in physical units
    pub fn physical(data: Array2<f64>, nodata: f64, undetect: f64) -> Self {
        Self::new(data, 1.0, 0.0, nodata, undetect)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Physical value of undetected cells
    pub fn undetect_value(&self) -> f64 {
        self.undetect * self.gain + self.offset
    }

    /// Convert to physical units. Nodata cells become `nodata`, undetected
    /// cells take the scaled undetect value.
    pub fn to_grid(&self, nodata: f64) -> Grid {
        let undetect = self.undetect_value();
        let data = self.data.mapv(|raw| {
            if raw == self.nodata {
                nodata
            } else if raw == self.undetect {
                undetect
            } else {
                raw * self.gain + self.offset
            }
        });
        Grid::with_nodata(data, nodata)
    }
}

/// A single elevation sweep
#[derive(Debug, Clone)]
pub struct PolarScan {
    /// Radar node identifier, e.g. "sehem"
    pub source: String,
    /// Elevation angle (radians)
    pub elangle: f64,
    /// Bin length (m)
    pub rscale: f64,
    /// Radar antenna height above sea level (m)
    pub height: f64,
    pub nrays: usize,
    pub nbins: usize,
    parameters: BTreeMap<String, ScanParameter>,
    quality_fields: BTreeMap<String, Grid>,
}

impl PolarScan {
    pub fn new(source: impl Into<String>, nrays: usize, nbins: usize, elangle: f64, rscale: f64) -> Self {
        Self {
            source: source.into(),
            elangle,
            rscale,
            height: 0.0,
            nrays,
            nbins,
            parameters: BTreeMap::new(),
            quality_fields: BTreeMap::new(),
        }
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    /// Add or replace a parameter; its shape must match the scan
    pub fn add_parameter(&mut self, quantity: impl Into<String>, parameter: ScanParameter) -> PpcResult<()> {
        let quantity = quantity.into();
        if parameter.dim() != (self.nrays, self.nbins) {
            return Err(PpcError::DimensionMismatch {
                context: format!("scan parameter {}", quantity),
                expected: (self.nrays, self.nbins),
                found: parameter.dim(),
            });
        }
        self.parameters.insert(quantity, parameter);
        Ok(())
    }

    pub fn parameter(&self, quantity: &str) -> Option<&ScanParameter> {
        self.parameters.get(quantity)
    }

    pub fn has_parameter(&self, quantity: &str) -> bool {
        self.parameters.contains_key(quantity)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn add_quality_field(&mut self, how_task: impl Into<String>, field: Grid) -> PpcResult<()> {
        let how_task = how_task.into();
        if field.dim() != (self.nrays, self.nbins) {
            return Err(PpcError::DimensionMismatch {
                context: format!("quality field {}", how_task),
                expected: (self.nrays, self.nbins),
                found: field.dim(),
            });
        }
        self.quality_fields.insert(how_task, field);
        Ok(())
    }

    pub fn quality_field(&self, how_task: &str) -> Option<&Grid> {
        self.quality_fields.get(how_task)
    }

    /// True if a quality field with this how/task is already attached
    pub fn has_quality_field(&self, how_task: &str) -> bool {
        self.quality_fields.contains_key(how_task)
    }

    /// Range bin length (km)
    pub fn rscale_km(&self) -> f64 {
        self.rscale / 1000.0
    }

    /// Beam centre height above sea level (km) at the middle of `bin`
    pub fn bin_height_km(&self, bin: usize) -> f64 {
        let range = self.rscale * (bin as f64 + 0.5);
        beam_height(range, self.elangle, self.height) / 1000.0
    }
}

/// All sweeps of one radar at one time
#[derive(Debug, Clone, Default)]
pub struct PolarVolume {
    pub source: String,
    pub scans: Vec<PolarScan>,
}

impl PolarVolume {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            scans: Vec::new(),
        }
    }

    pub fn add_scan(&mut self, scan: PolarScan) {
        self.scans.push(scan);
    }
}

/// Beam height above sea level (m) for slant `range` (m) at elevation
/// `elangle` (radians) using the 4/3 effective earth radius model
pub fn beam_height(range: f64, elangle: f64, antenna_height: f64) -> f64 {
    let re = EFFECTIVE_RADIUS_FACTOR * EARTH_RADIUS;
    (range * range + re * re + 2.0 * range * re * elangle.sin()).sqrt() - re + antenna_height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_physical() {
        let raw = Array2::from_shape_vec((1, 4), vec![0.0, 255.0, 100.0, 10.0]).unwrap();
        let param = ScanParameter::new(raw, 0.5, -32.0, 255.0, 0.0);
        let grid = param.to_grid(-999.0);

        assert_eq!(grid.to_rows()[0], vec![-32.0, -999.0, 18.0, -27.0]);
        assert_eq!(grid.nodata(), -999.0);
        assert!(grid.uses_nodata());
        assert_eq!(param.undetect_value(), -32.0);
    }

    #[test]
    fn test_add_parameter_checks_shape() {
        let mut scan = PolarScan::new("sehem", 3, 4, 0.5f64.to_radians(), 500.0);
        let good = ScanParameter::physical(Array2::zeros((3, 4)), -999.0, -32.0);
        let bad = ScanParameter::physical(Array2::zeros((4, 3)), -999.0, -32.0);
        assert!(scan.add_parameter("TH", good).is_ok());
        assert!(scan.add_parameter("DBZH", bad).is_err());
        assert!(scan.has_parameter("TH"));
        assert!(!scan.has_parameter("DBZH"));
    }

    #[test]
    fn test_beam_height() {
        assert!((beam_height(0.0, 0.0, 120.0) - 120.0).abs() < 1e-6);
        // 100 km at 0.5 degrees: about 0.87 km from elevation plus 0.59 km curvature
        let h = beam_height(100_000.0, 0.5f64.to_radians(), 0.0);
        assert!(h > 1400.0 && h < 1500.0, "h = {}", h);

        let scan = PolarScan::new("sehem", 1, 10, 0.0, 1000.0);
        assert!(scan.bin_height_km(9) > scan.bin_height_km(0));
    }
}

use crate::core::grid::{Grid, Window};
use crate::core::options::RadarOptions;
use crate::types::PpcResult;

/// Median filter cleanup of isolated reflectivity cells
pub struct Despeckler {
    /// Values from the grid minimum up to this are collapsed to the minimum
    min_z_medfilter_threshold: f64,
}

impl Despeckler {
    pub fn new() -> Self {
        Self::with_threshold(RadarOptions::default().min_z_medfilter_threshold)
    }

    pub fn with_threshold(min_z_medfilter_threshold: f64) -> Self {
        Self {
            min_z_medfilter_threshold,
        }
    }

    /// Keep cells above `threshold` only where the median filtered
    /// threshold mask agrees; everything else takes the raw grid minimum.
    pub fn medfilt(&self, z: &Grid, threshold: f64, window: Window) -> PpcResult<Grid> {
        log::debug!(
            "Median filtering {}x{} grid with window {:?}",
            z.nrays(),
            z.nbins(),
            window
        );

        let min_value = match z.raw_min() {
            Some(v) => v,
            None => return Ok(z.clone()),
        };

        let (nrays, nbins) = z.dim();
        let mut mask = Grid::zeros(nrays, nbins);
        let mut above = 0usize;
        for ray in 0..nrays {
            for bin in 0..nbins {
                if z.get(ray, bin) > threshold {
                    mask.set(ray, bin, 1.0);
                    above += 1;
                }
            }
        }
        let filtered_mask = if above > 0 {
            mask.median_filter(window)
        } else {
            mask
        };

        let mut out = z.clone();
        for ray in 0..nrays {
            for bin in 0..nbins {
                let v = z.get(ray, bin);
                let m = filtered_mask.get(ray, bin);
                let mut result = v * m;
                if m == 0.0 {
                    result = min_value;
                }
                if v >= min_value && v < self.min_z_medfilter_threshold {
                    result = min_value;
                }
                out.set(ray, bin, result);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medfilt() {
        let z = Grid::from_rows(&[
            vec![1.0, 2.0, 3.0, -33.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![8.0, 7.0, 6.0, 5.0],
            vec![4.0, 3.0, 2.0, 1.0],
        ])
        .unwrap();
        let result = Despeckler::new().medfilt(&z, -20.0, Window::square(3)).unwrap();

        assert_eq!(result.to_rows()[0], vec![-33.0, 2.0, 3.0, -33.0]);
        assert_eq!(result.to_rows()[1], vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(result.to_rows()[2], vec![8.0, 7.0, 6.0, 5.0]);
        assert_eq!(result.to_rows()[3], vec![-33.0, 3.0, 2.0, -33.0]);
    }

    #[test]
    fn test_medfilt_nothing_above_threshold() {
        let z = Grid::from_rows(&[vec![-40.0, -35.0], vec![-50.0, -45.0]]).unwrap();
        let result = Despeckler::new().medfilt(&z, -20.0, Window::square(3)).unwrap();
        assert!(result.data().iter().all(|&v| v == -50.0));
    }

    #[test]
    fn test_default_threshold_follows_options() {
        let options = RadarOptions::default();
        assert_eq!(
            Despeckler::new().min_z_medfilter_threshold,
            options.min_z_medfilter_threshold
        );
    }
}

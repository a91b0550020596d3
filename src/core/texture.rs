use crate::core::grid::Grid;
use crate::types::PpcResult;
use ndarray::Array2;

/// Minimum summed neighbour weight for a texture value
const MIN_NEIGHBOUR_WEIGHT: f64 = 3.0;

/// Local texture over the 3x3 neighbourhood of every cell.
///
/// The neighbourhood wraps around in both directions. With `w` the number of
/// valid neighbours of a valid cell `c`, the texture is
/// `sqrt(sum((n - c)^2)) / w`; cells that are invalid or have fewer than three
/// valid neighbours get the input nodata.
pub fn texture(input: &Grid) -> PpcResult<Grid> {
    input.require_nodata("texture")?;

    let (nrays, nbins) = input.dim();
    let nodata = input.nodata();
    let mut out = Array2::from_elem((nrays, nbins), nodata);

    for ray in 0..nrays {
        for bin in 0..nbins {
            let centre = input.get(ray, bin);
            if !input.is_valid_value(centre) {
                continue;
            }

            let mut sum_sq = 0.0;
            let mut weight = 0.0;
            for dr in 0..3 {
                for db in 0..3 {
                    if dr == 1 && db == 1 {
                        continue;
                    }
                    let r = (ray + nrays + dr - 1) % nrays;
                    let b = (bin + nbins + db - 1) % nbins;
                    let v = input.get(r, b);
                    if input.is_valid_value(v) {
                        sum_sq += (v - centre) * (v - centre);
                        weight += 1.0;
                    }
                }
            }

            if weight >= MIN_NEIGHBOUR_WEIGHT {
                out[[ray, bin]] = sum_sq.sqrt() / weight;
            }
        }
    }

    Ok(Grid::with_nodata(out, nodata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PpcError;

    fn assert_close(grid: &Grid, expected: &[Vec<f64>], tolerance: f64) {
        for (ray, row) in expected.iter().enumerate() {
            for (bin, value) in row.iter().enumerate() {
                assert!(
                    (grid.get(ray, bin) - value).abs() < tolerance,
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
    fn test_texture_full_grid() {
        let grid = Grid::from_rows(&[
            vec![1.0, 2.0, 3.0, 4.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![8.0, 7.0, 6.0, 5.0],
            vec![4.0, 3.0, 2.0, 1.0],
        ])
        .unwrap();
        let grid = Grid::with_nodata(grid.into_data(), -999.0);

        let result = texture(&grid).unwrap();
        assert_close(&result, &[vec![1.32877, 0.94373, 0.94373, 0.87500]], 1e-3);
    }

    #[test]
    fn test_texture_with_nodata_corners() {
        let grid = Grid::from_rows(&[
            vec![-999.0, 2.0, 3.0, -999.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![8.0, 7.0, 6.0, 5.0],
            vec![-999.0, 3.0, 2.0, -999.0],
        ])
        .unwrap();
        let grid = Grid::with_nodata(grid.into_data(), -999.0);

        let result = texture(&grid).unwrap();
        assert_close(
            &result,
            &[
                vec![-999.0, 1.20185, 1.20185, -999.0],
                vec![0.94281, 0.80812, 0.98974, 1.15470],
                vec![1.15470, 0.98974, 0.80812, 0.94281],
                vec![-999.0, 1.20185, 1.20185, -999.0],
            ],
            1e-3,
        );
    }

    #[test]
    fn test_texture_non_square() {
        let grid = Grid::from_rows(&[
            vec![-999.0, 2.0, 3.0, 4.0, -999.0],
            vec![5.0, 6.0, 6.0, 7.0, 8.0],
            vec![8.0, 7.0, 7.0, 6.0, 5.0],
            vec![-999.0, 3.0, 1.0, 2.0, -999.0],
        ])
        .unwrap();
        let grid = Grid::with_nodata(grid.into_data(), -999.0);

        let result = texture(&grid).unwrap();
        assert_close(
            &result,
            &[
                vec![-999.0, 1.106, 0.8, 1.093],
                vec![0.943, 0.808, 0.707, 0.808],
                vec![1.155, 1.097, 1.118, 0.990],
                vec![-999.0, 1.312, 1.346, 1.247],
            ],
            1e-3,
        );
    }

    #[test]
    fn test_texture_requires_nodata() {
        let grid = Grid::zeros(3, 3);
        assert!(matches!(texture(&grid), Err(PpcError::NodataRequired(_))));
    }
}

use crate::core::grid::Grid;
use crate::types::{PpcError, PpcResult};
use ndarray::Array2;

/// Trapezoidal membership tuning for one classifier input.
///
/// Stored in the configuration order `[weight, lower, upper, rise, fall]`:
/// membership is 1 on `[lower, upper]`, ramps up over `rise` below `lower`
/// and down over `fall` above `upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembershipParams {
    pub weight: f64,
    pub lower: f64,
    pub upper: f64,
    pub rise: f64,
    pub fall: f64,
}

impl MembershipParams {
    pub const fn new(weight: f64, lower: f64, upper: f64, rise: f64, fall: f64) -> Self {
        Self {
            weight,
            lower,
            upper,
            rise,
            fall,
        }
    }

    /// Parse the five element configuration vector
    pub fn from_slice(values: &[f64]) -> PpcResult<Self> {
        match values {
            [weight, lower, upper, rise, fall] => {
                Ok(Self::new(*weight, *lower, *upper, *rise, *fall))
            }
            _ => Err(PpcError::invalid_argument(format!(
                "membership parameters need 5 values, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.weight, self.lower, self.upper, self.rise, self.fall]
    }

    pub fn membership(&self, input: &Grid) -> Grid {
        trap(input, self.lower, self.upper, self.rise, self.fall)
    }

    pub fn value(&self, x: f64) -> f64 {
        trap_value(x, self.lower, self.upper, self.rise, self.fall)
    }
}

/// Trapezoid with plateau `[a, b]`, rising edge of width `s` and falling edge
/// of width `t`. Zero-width edges collapse to a step.
pub fn trap_value(x: f64, a: f64, b: f64, s: f64, t: f64) -> f64 {
    let mut out = 0.0;
    if x <= a - s || x > b + t {
        out = 0.0;
    }
    if x >= a && x <= b {
        out = 1.0;
    }
    if x > a - s && x < a {
        out = (x - a + s) / s;
    }
    if x >= b && x < b + t {
        out = (b + t - x) / t;
    }
    out
}

/// Cell-wise trapezoidal membership. Nodata is not consulted; the result has
/// nodata handling disabled.
pub fn trap(input: &Grid, a: f64, b: f64, s: f64, t: f64) -> Grid {
    let data: Array2<f64> = input.data().mapv(|x| trap_value(x, a, b, s, t));
    Grid::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pattern() -> Grid {
        Grid::from_rows(&[
            vec![1.0, 2.0, 3.0, 4.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![8.0, 7.0, 6.0, 5.0],
            vec![4.0, 3.0, 2.0, 1.0],
        ])
        .unwrap()
    }

    fn assert_rows(grid: &Grid, expected: &[[f64; 4]; 4]) {
        for (ray, row) in expected.iter().enumerate() {
            for (bin, value) in row.iter().enumerate() {
                assert_abs_diff_eq!(grid.get(ray, bin), *value, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_trap_falling_edge() {
        let result = trap(&pattern(), 1.0, 2.0, 3.0, 4.0);
        assert_rows(
            &result,
            &[
                [1.0, 1.0, 0.75, 0.5],
                [0.25, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.25],
                [0.5, 0.75, 1.0, 1.0],
            ],
        );
    }

    #[test]
    fn test_trap_zero_fall_width() {
        let result = trap(&pattern(), 1.0, 2.0, 3.0, 0.0);
        assert_rows(
            &result,
            &[
                [1.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 1.0],
            ],
        );
    }

    #[test]
    fn test_trap_rising_edge() {
        assert!((trap_value(0.0, 1.0, 2.0, 2.0, 1.0) - 0.5).abs() < 1e-12);
        assert_eq!(trap_value(-1.0, 1.0, 2.0, 2.0, 1.0), 0.0);
        assert_eq!(trap_value(3.0, 1.0, 2.0, 2.0, 1.0), 0.0);
    }

    #[test]
    fn test_params_from_slice() {
        let params = MembershipParams::from_slice(&[0.3, -0.9, 0.9, 0.15, 0.15]).unwrap();
        assert_eq!(params.weight, 0.3);
        assert_eq!(params.to_array(), [0.3, -0.9, 0.9, 0.15, 0.15]);
        assert!(MembershipParams::from_slice(&[1.0, 2.0]).is_err());
    }
}

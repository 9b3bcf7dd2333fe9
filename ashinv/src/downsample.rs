//! Adaptive block-aggregation downsampling for large matrices.
//!
//! Rendering a system matrix with hundreds of thousands of rows cell by cell
//! is hopeless, so the matrix is first reduced to roughly the output pixel
//! resolution. Reduction factors are integers built from the prime
//! factorization of each axis length, which keeps every block exactly the
//! same size and the reduction an exact rebinning rather than a resample.

use std::str::FromStr;

use ndarray::Array2;

use crate::AshError;

/// Summary statistic applied to each block during rebinning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregator {
    Mean,
    Median,
    Max,
    Min,
}

impl FromStr for Aggregator {
    type Err = AshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregator::Mean),
            "median" => Ok(Aggregator::Median),
            "max" => Ok(Aggregator::Max),
            "min" => Ok(Aggregator::Min),
            other => Err(AshError::InvalidAggregator(other.to_string())),
        }
    }
}

/// Prime factorization of `n` by trial division, in ascending order.
pub fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut i = 2;
    while i * i <= n {
        if n % i != 0 {
            i += 1;
        } else {
            n /= i;
            factors.push(i);
        }
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Largest decimation factor for one axis such that the reduced length still
/// exceeds `target`.
///
/// Greedy prefix of the ascending prime factorization: accumulate factors
/// while the quotient stays above the target, stop at the first violation.
/// Any prefix of the factorization divides `len` exactly, so the reduced
/// length is always `len / factor` with no remainder.
pub fn axis_factor(len: usize, target: usize) -> usize {
    if len == 0 || target >= len {
        return 1;
    }
    let mut factor = 1;
    for f in prime_factors(len) {
        if len / (factor * f) > target {
            factor *= f;
        } else {
            break;
        }
    }
    factor
}

/// Reduce `matrix` to a shape close to, but never below, `target` using
/// per-axis integer block aggregation.
///
/// Output shape is exactly `(rows / f0, cols / f1)` for the computed axis
/// factors. Axes already at or below the target keep factor 1. The input is
/// not mutated.
pub fn downsample(matrix: &Array2<f64>, target: (usize, usize), agg: Aggregator) -> Array2<f64> {
    let (rows, cols) = matrix.dim();
    let f0 = axis_factor(rows, target.0);
    let f1 = axis_factor(cols, target.1);
    if f0 == 1 && f1 == 1 {
        return matrix.clone();
    }

    let out_rows = rows / f0;
    let out_cols = cols / f1;
    let mut out = Array2::zeros((out_rows, out_cols));
    let mut block = Vec::with_capacity(f0 * f1);
    for i in 0..out_rows {
        for j in 0..out_cols {
            block.clear();
            for r in i * f0..(i + 1) * f0 {
                for c in j * f1..(j + 1) * f1 {
                    block.push(matrix[[r, c]]);
                }
            }
            out[[i, j]] = aggregate(&mut block, agg);
        }
    }
    out
}

fn aggregate(block: &mut [f64], agg: Aggregator) -> f64 {
    match agg {
        Aggregator::Mean => block.iter().sum::<f64>() / block.len() as f64,
        Aggregator::Median => median(block),
        Aggregator::Max => block.iter().copied().fold(f64::MIN, f64::max),
        Aggregator::Min => block.iter().copied().fold(f64::MAX, f64::min),
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn prime_factors_ascending() {
        assert_eq!(prime_factors(1), Vec::<usize>::new());
        assert_eq!(prime_factors(2), vec![2]);
        assert_eq!(prime_factors(12), vec![2, 2, 3]);
        assert_eq!(prime_factors(100), vec![2, 2, 5, 5]);
        assert_eq!(prime_factors(97), vec![97]);
    }

    #[test]
    fn axis_factor_stays_above_target() {
        // 100 -> primes [2, 2, 5, 5]; 100/2=50>10, 100/4=25>10, 100/20=5 stops.
        assert_eq!(axis_factor(100, 10), 4);
        assert_eq!(axis_factor(100, 3), 20);
        // Reducing 4 toward 2 would land exactly on the target, so no-op.
        assert_eq!(axis_factor(4, 2), 1);
        assert_eq!(axis_factor(4, 1), 2);
        // Target at or beyond the axis length leaves the axis alone.
        assert_eq!(axis_factor(8, 8), 1);
        assert_eq!(axis_factor(8, 20), 1);
    }

    #[test]
    fn axis_factor_always_divides_evenly() {
        for len in [6usize, 24, 60, 97, 100, 360, 1024] {
            for target in [1usize, 2, 7, 10, 50] {
                let f = axis_factor(len, target);
                assert_eq!(len % f, 0, "factor {f} does not divide {len}");
                assert!(len / f > target || f == 1);
            }
        }
    }

    #[test]
    fn downsample_shape_guarantee() {
        let m = Array2::<f64>::zeros((100, 60));
        let out = downsample(&m, (10, 10), Aggregator::Mean);
        let f0 = axis_factor(100, 10);
        let f1 = axis_factor(60, 10);
        assert_eq!(out.dim(), (100 / f0, 60 / f1));
        assert!(out.nrows() > 10 && out.ncols() > 10);
    }

    #[test]
    fn downsample_noop_axis_is_unchanged() {
        let m = Array2::from_shape_fn((8, 5), |(r, c)| (r * 5 + c) as f64);
        let out = downsample(&m, (1, 10), Aggregator::Max);
        assert_eq!(out.ncols(), 5);
        assert_eq!(out.nrows(), 2);
        // Column axis untouched: each output cell is the max of a 4x1 block.
        assert_eq!(out[[0, 0]], 15.0);
        assert_eq!(out[[1, 4]], 39.0);
    }

    #[test]
    fn aggregators_reduce_constant_blocks_exactly() {
        let m = array![
            [1.0, 1.0, 2.0, 2.0],
            [1.0, 1.0, 2.0, 2.0],
            [3.0, 3.0, 4.0, 4.0],
            [3.0, 3.0, 4.0, 4.0],
        ];
        for agg in [Aggregator::Mean, Aggregator::Max, Aggregator::Min] {
            let out = downsample(&m, (1, 1), agg);
            assert_eq!(out, array![[1.0, 2.0], [3.0, 4.0]], "agg {agg:?}");
        }
    }

    #[test]
    fn median_takes_whole_block() {
        let m = array![
            [1.0, 9.0, 5.0, 5.0],
            [2.0, 3.0, 5.0, 5.0],
            [0.0, 0.0, 7.0, 8.0],
            [0.0, 1.0, 9.0, 6.0],
        ];
        let out = downsample(&m, (1, 1), Aggregator::Median);
        assert_eq!(out[[0, 0]], 2.5);
        assert_eq!(out[[0, 1]], 5.0);
        assert_eq!(out[[1, 0]], 0.0);
        assert_eq!(out[[1, 1]], 7.5);
    }

    #[test]
    fn constant_matrix_mean_is_exact() {
        let m = Array2::from_elem((100, 100), 3.0);
        let out = downsample(&m, (10, 10), Aggregator::Mean);
        let (d0, d1) = out.dim();
        assert!(d0 > 10 && d0 <= 100 && 100 % d0 == 0);
        assert!(d1 > 10 && d1 <= 100 && 100 % d1 == 0);
        assert!(out.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn aggregator_parsing() {
        assert_eq!("mean".parse::<Aggregator>().unwrap(), Aggregator::Mean);
        assert_eq!("Median".parse::<Aggregator>().unwrap(), Aggregator::Median);
        assert!(matches!(
            "bilinear".parse::<Aggregator>(),
            Err(AshError::InvalidAggregator(_))
        ));
    }
}

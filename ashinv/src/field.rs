//! Sparse-to-dense reconstruction of emission fields and shared-bounding-box
//! pruning.
//!
//! The inversion solver emits a flat array of mass values in solver order;
//! the ordering index table maps each (elevation, time) cell back to its
//! position in that array, with a negative sentinel for cells that carry no
//! emission. Reconstruction produces a dense field with an explicit validity
//! mask instead of a masked-array type.

use std::ops::Range;

use ndarray::{s, Array2};

use crate::AshError;

/// Dense 2D emission field (elevation x time) with a parallel validity mask.
///
/// Cells where the mask is false hold no data and are excluded from every
/// reduction. Immutable after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskedField {
    values: Array2<f64>,
    valid: Array2<bool>,
}

impl MaskedField {
    /// Assemble a field from dense values and a validity mask of equal shape.
    pub fn from_parts(values: Array2<f64>, valid: Array2<bool>) -> Self {
        assert_eq!(values.dim(), valid.dim(), "value/mask shape mismatch");
        Self { values, valid }
    }

    /// (levels, timesteps)
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn validity(&self) -> &Array2<bool> {
        &self.valid
    }

    /// Value at (level, timestep), or `None` for a masked cell.
    pub fn get(&self, level: usize, timestep: usize) -> Option<f64> {
        if self.valid[[level, timestep]] {
            Some(self.values[[level, timestep]])
        } else {
            None
        }
    }

    /// Maximum over all valid cells; `None` if every cell is masked.
    pub fn max(&self) -> Option<f64> {
        let mut best: Option<f64> = None;
        for (value, &ok) in self.values.iter().zip(self.valid.iter()) {
            if ok {
                best = Some(best.map_or(*value, |b: f64| b.max(*value)));
            }
        }
        best
    }

    /// Maximum over the valid cells of one elevation row.
    pub fn row_max(&self, row: usize) -> Option<f64> {
        let mut best: Option<f64> = None;
        for t in 0..self.values.ncols() {
            if self.valid[[row, t]] {
                let v = self.values[[row, t]];
                best = Some(best.map_or(v, |b: f64| b.max(v)));
            }
        }
        best
    }

    /// Maximum over the valid cells of one timestep column.
    pub fn col_max(&self, col: usize) -> Option<f64> {
        let mut best: Option<f64> = None;
        for a in 0..self.values.nrows() {
            if self.valid[[a, col]] {
                let v = self.values[[a, col]];
                best = Some(best.map_or(v, |b: f64| b.max(v)));
            }
        }
        best
    }

    /// Per-timestep sum of valid cells (the total mass emitted per step).
    pub fn column_sums(&self) -> Vec<f64> {
        let (rows, cols) = self.dim();
        let mut sums = vec![0.0; cols];
        for t in 0..cols {
            for a in 0..rows {
                if self.valid[[a, t]] {
                    sums[t] += self.values[[a, t]];
                }
            }
        }
        sums
    }

    /// Crop to a bounding box, allocating a new field.
    pub fn crop(&self, bounds: &PruneBounds) -> MaskedField {
        let lv = bounds.levels.start..bounds.levels.end;
        let tm = bounds.times.start..bounds.times.end;
        MaskedField {
            values: self.values.slice(s![lv.clone(), tm.clone()]).to_owned(),
            valid: self.valid.slice(s![lv, tm]).to_owned(),
        }
    }

    /// Apply a cell-wise transform to the valid cells, preserving the mask.
    pub fn map<F: Fn(usize, usize, f64) -> f64>(&self, f: F) -> MaskedField {
        let mut values = self.values.clone();
        for ((a, t), v) in values.indexed_iter_mut() {
            if self.valid[[a, t]] {
                *v = f(a, t, *v);
            }
        }
        MaskedField {
            values,
            valid: self.valid.clone(),
        }
    }
}

/// Shared bounding box for a pair of comparable fields: a contiguous
/// elevation prefix and a contiguous timestep range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PruneBounds {
    pub levels: Range<usize>,
    pub times: Range<usize>,
}

/// Expand a flat emission-value array into a dense masked field through the
/// ordering index table.
///
/// Negative index entries become masked cells. A non-negative entry at or
/// beyond `values.len()` is a hard error; indices are never clamped.
/// Duplicate indices are a caller logic error and are not detected.
pub fn expand(ordering_index: &Array2<i64>, values: &[f64]) -> Result<MaskedField, AshError> {
    let shape = ordering_index.dim();
    let mut out = Array2::zeros(shape);
    let mut valid = Array2::from_elem(shape, false);
    for ((a, t), &index) in ordering_index.indexed_iter() {
        if index < 0 {
            continue;
        }
        let index = index as usize;
        let value = values.get(index).ok_or(AshError::IndexOutOfRange {
            index,
            len: values.len(),
        })?;
        out[[a, t]] = *value;
        valid[[a, t]] = true;
    }
    Ok(MaskedField { values: out, valid })
}

/// Compute the shared bounding box that trims rows/columns carrying no
/// signal in either field.
///
/// A row survives when `row_max(a) + row_max(b) > threshold`; the elevation
/// range always starts at 0 and ends after the last surviving row. Columns
/// use the same criterion, with caller-supplied explicit time bounds taking
/// precedence over the computed ones. Rows/columns that are fully masked in
/// either field never survive.
pub fn prune_bounds(
    a: &MaskedField,
    b: &MaskedField,
    threshold: f64,
    time_min: Option<usize>,
    time_max: Option<usize>,
) -> Result<PruneBounds, AshError> {
    let (rows, cols) = a.dim();
    if b.dim() != (rows, cols) {
        return Err(AshError::ShapeMismatch(format!(
            "cannot prune fields of shape {:?} and {:?} together",
            a.dim(),
            b.dim()
        )));
    }

    let row_alive = |r: usize| match (a.row_max(r), b.row_max(r)) {
        (Some(x), Some(y)) => x + y > threshold,
        _ => false,
    };
    let col_alive = |c: usize| match (a.col_max(c), b.col_max(c)) {
        (Some(x), Some(y)) => x + y > threshold,
        _ => false,
    };

    let last_row = (0..rows)
        .rev()
        .find(|&r| row_alive(r))
        .ok_or(AshError::NoDataAboveThreshold)?;

    let (start, end) = match (time_min, time_max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (lo, hi) => {
            let alive: Vec<usize> = (0..cols).filter(|&c| col_alive(c)).collect();
            let first = *alive.first().ok_or(AshError::NoDataAboveThreshold)?;
            let last = *alive.last().ok_or(AshError::NoDataAboveThreshold)?;
            (lo.unwrap_or(first), hi.unwrap_or(last + 1))
        }
    };
    let start = start.min(cols);
    let end = end.min(cols);
    if start >= end {
        return Err(AshError::NoDataAboveThreshold);
    }

    Ok(PruneBounds {
        levels: 0..last_row + 1,
        times: start..end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn all_zero(rows: usize, cols: usize) -> MaskedField {
        MaskedField::from_parts(
            Array2::zeros((rows, cols)),
            Array2::from_elem((rows, cols), true),
        )
    }

    #[test]
    fn expand_places_values_through_index_table() {
        let index = array![[-1_i64, 0], [1, -1]];
        let field = expand(&index, &[5.0, 7.0]).unwrap();
        assert_eq!(field.get(0, 0), None);
        assert_eq!(field.get(0, 1), Some(5.0));
        assert_eq!(field.get(1, 0), Some(7.0));
        assert_eq!(field.get(1, 1), None);
    }

    #[test]
    fn expand_rejects_out_of_range_index() {
        let index = array![[0_i64, 2]];
        let err = expand(&index, &[1.0, 2.0]).unwrap_err();
        match err {
            AshError::IndexOutOfRange { index, len } => {
                assert_eq!(index, 2);
                assert_eq!(len, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn prune_keeps_all_rows_with_signal() {
        // Expanded [[masked,5],[7,masked]] against all zeros with threshold 0
        // keeps the full 2x2 box.
        let index = array![[-1_i64, 0], [1, -1]];
        let field = expand(&index, &[5.0, 7.0]).unwrap();
        let zeros = all_zero(2, 2);
        let bounds = prune_bounds(&field, &zeros, 0.0, None, None).unwrap();
        assert_eq!(bounds.levels, 0..2);
        assert_eq!(bounds.times, 0..2);
    }

    #[test]
    fn prune_trims_empty_top_rows_and_edge_columns() {
        let a = MaskedField::from_parts(
            array![[0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 2.0, 0.0], [0.0, 0.0, 0.0, 0.0]],
            Array2::from_elem((3, 4), true),
        );
        let b = all_zero(3, 4);
        let bounds = prune_bounds(&a, &b, 0.0, None, None).unwrap();
        assert_eq!(bounds.levels, 0..2);
        assert_eq!(bounds.times, 1..3);

        let cropped_a = a.crop(&bounds);
        let cropped_b = b.crop(&bounds);
        assert_eq!(cropped_a.dim(), (2, 2));
        assert_eq!(cropped_a.dim(), cropped_b.dim());
        assert_eq!(cropped_a.get(0, 0), Some(1.0));
        assert_eq!(cropped_a.get(1, 1), Some(2.0));

        // Every dropped row/column is at or below the threshold in both.
        for c in [0, 3] {
            let total = a.col_max(c).unwrap() + b.col_max(c).unwrap();
            assert!(total <= 0.0);
        }
        assert!(a.row_max(2).unwrap() + b.row_max(2).unwrap() <= 0.0);
    }

    #[test]
    fn prune_explicit_time_bounds_take_precedence() {
        let a = MaskedField::from_parts(
            array![[0.0, 1.0, 1.0, 0.0]],
            Array2::from_elem((1, 4), true),
        );
        let b = all_zero(1, 4);
        let bounds = prune_bounds(&a, &b, 0.0, Some(0), Some(4)).unwrap();
        assert_eq!(bounds.times, 0..4);

        let bounds = prune_bounds(&a, &b, 0.0, None, Some(3)).unwrap();
        assert_eq!(bounds.times, 1..3);
    }

    #[test]
    fn prune_fails_when_nothing_clears_threshold() {
        let a = all_zero(2, 2);
        let b = all_zero(2, 2);
        let err = prune_bounds(&a, &b, 0.0, None, None).unwrap_err();
        assert!(matches!(err, AshError::NoDataAboveThreshold));
    }

    #[test]
    fn prune_ignores_fully_masked_rows() {
        let a = MaskedField::from_parts(
            array![[1.0, 1.0], [9.0, 9.0]],
            array![[true, true], [false, false]],
        );
        let b = all_zero(2, 2);
        let bounds = prune_bounds(&a, &b, 0.0, None, None).unwrap();
        assert_eq!(bounds.levels, 0..1);
    }

    #[test]
    fn column_sums_skip_masked_cells() {
        let f = MaskedField::from_parts(
            array![[1.0, 2.0], [3.0, 4.0]],
            array![[true, false], [true, true]],
        );
        assert_eq!(f.column_sums(), vec![4.0, 4.0]);
    }
}

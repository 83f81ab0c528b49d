//! Per-entity forward fill over non-trading days.
//!
//! Zero means "absent". Scanning each row left to right, a zero cell after the
//! first non-zero value takes the last non-zero value seen; cells before the
//! first non-zero stay zero.

use ndarray::{Array2, ArrayViewMut1, Axis, Zip};

/// Forward-fill one row in place. Returns the number of cells written.
pub fn fill_row(mut row: ArrayViewMut1<'_, f64>) -> usize {
    let mut last: Option<f64> = None;
    let mut filled = 0;
    for cell in row.iter_mut() {
        if *cell != 0.0 {
            last = Some(*cell);
        } else if let Some(v) = last {
            *cell = v;
            filled += 1;
        }
    }
    filled
}

/// Forward-fill every row of `m` over its first `cols` columns.
pub fn fill_matrix(m: &mut Array2<f64>, cols: usize) -> usize {
    let cols = cols.min(m.ncols());
    let mut view = m.slice_axis_mut(Axis(1), (0..cols).into());
    let mut counts = vec![0usize; view.nrows()];
    Zip::from(view.rows_mut())
        .and(&mut counts[..])
        .par_for_each(|row, count| *count = fill_row(row));
    counts.iter().sum()
}

//! Floor-trader pivot points for one column.
//!
//! `P = (H+L+C)/3`, `R1 = 2P − L`, `S1 = 2P − H`, `R2 = P + (H−L)`,
//! `S2 = P − (H−L)`.

use ndarray::{Array2, Zip};

use super::OpOutput;

/// Compute pivots from the `high`, `low` and `close` matrices at `col`.
///
/// The primary matrix holds `P` at `col` and NaN elsewhere. MetaData is the
/// `E × 5` matrix `[P, R1, S1, R2, S2]`. Entities without a full
/// non-zero `H/L/C` triple get a NaN row.
pub fn pivot(high: &Array2<f64>, low: &Array2<f64>, close: &Array2<f64>, col: usize) -> OpOutput {
    let (rows, cols) = close.dim();
    let mut data = Array2::from_elem((rows, cols), f64::NAN);
    let mut meta = Array2::from_elem((rows, 5), f64::NAN);
    let mut labels = vec![String::new(); rows];

    Zip::from(meta.rows_mut())
        .and(data.rows_mut())
        .and(high.column(col))
        .and(low.column(col))
        .and(close.column(col))
        .and(&mut labels[..])
        .par_for_each(|mut m, mut out, &h, &l, &c, label| {
            let live = |v: f64| v.is_finite() && v != 0.0;
            if !(live(h) && live(l) && live(c)) {
                return;
            }
            let p = (h + l + c) / 3.0;
            let levels = [p, 2.0 * p - l, 2.0 * p - h, p + (h - l), p - (h - l)];
            for (slot, v) in m.iter_mut().zip(levels) {
                *slot = v;
            }
            out[col] = p;
            *label = format!(
                "P {:.2} R1 {:.2} S1 {:.2} R2 {:.2} S2 {:.2}",
                levels[0], levels[1], levels[2], levels[3], levels[4]
            );
        });

    OpOutput {
        data,
        meta,
        labels,
        blocks: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::assert_row;
    use ndarray::array;

    #[test]
    fn pivot_levels() {
        let high = array![[0.0, 12.0], [0.0, 5.0]];
        let low = array![[0.0, 6.0], [0.0, 0.0]];
        let close = array![[0.0, 9.0], [0.0, 4.0]];
        let out = pivot(&high, &low, &close, 1);
        assert_row(out.meta.row(0), &[9.0, 12.0, 6.0, 15.0, 3.0]);
        assert_row(out.data.row(0), &[f64::NAN, 9.0]);
        assert!(out.meta.row(1).iter().all(|v| v.is_nan()));
        assert_eq!(out.labels[1], "");
    }
}

//! Return operators: `srel`, `rel`, `reton`, `roll`.
//!
//! Zero means "not yet alive". A row whose reference value is zero or
//! non-finite produces no returns rather than an error.

use ndarray::{Array2, ArrayView1, ArrayViewMut1};

use super::stats::finite_mean_std;
use super::{map_rows, OpOutput, RetKind, DAYS_PER_YEAR, MIN_THRESHOLD};

/// Historical gaps (columns) reported by `reton`, with their labels.
pub const RETON_GAPS: [(usize, &str); 9] = [
    (1, "1D"),
    (7, "1W"),
    (30, "1M"),
    (91, "3M"),
    (182, "6M"),
    (365, "1Y"),
    (1095, "3Y"),
    (1825, "5Y"),
    (3650, "10Y"),
];

/// Geometric annualisation of `ratio` over `years`. NaN for a non-positive span.
fn annualise(ratio: f64, years: f64) -> f64 {
    if years <= 0.0 {
        return f64::NAN;
    }
    (ratio.powf(1.0 / years) - 1.0) * 100.0
}

fn relative_label(abs: f64, retpa: f64, years: f64) -> String {
    format!("{abs:8.2}% {retpa:8.2}%pa {years:5.2}y")
}

/// Fill `out[cs..=ce]` with returns against `v0` and write the
/// `[absReturn, returnPerAnnum, durationYears]` metadata.
fn relative_row(
    src: ArrayView1<'_, f64>,
    mut out: ArrayViewMut1<'_, f64>,
    mut meta: ArrayViewMut1<'_, f64>,
    base: usize,
    cs: usize,
    ce: usize,
) -> String {
    let v0 = src[base];
    let years = (ce as f64 - base as f64 + 1.0) / DAYS_PER_YEAR;
    if v0 == 0.0 || !v0.is_finite() {
        for c in cs..=ce {
            out[c] = 0.0;
        }
        meta[0] = 0.0;
        meta[1] = 0.0;
        meta[2] = (ce - cs + 1) as f64 / DAYS_PER_YEAR;
        return String::new();
    }
    for c in cs..=ce {
        out[c] = (src[c] / v0 - 1.0) * 100.0;
    }
    let abs = out[ce];
    let retpa = annualise(src[ce] / v0, years);
    meta[0] = abs;
    meta[1] = retpa;
    meta[2] = years;
    relative_label(abs, retpa, years)
}

/// `srel`: returns relative to each entity's first live value in `[cs, ce]`.
/// Columns before that value are NaN.
pub fn srel(src: &Array2<f64>, cs: usize, ce: usize) -> OpOutput {
    map_rows(src, 3, |s, out, meta| {
        match (cs..=ce).find(|&c| s[c] != 0.0 && s[c].is_finite()) {
            Some(i_start) => relative_row(s, out, meta, i_start, i_start, ce),
            // Entirely zero: every cell stays zero.
            None => relative_row(s, out, meta, cs, cs, ce),
        }
    })
}

/// `rel[BASE]`: returns relative to the value at `base_col` for every entity.
pub fn rel(src: &Array2<f64>, base_col: usize, cs: usize, ce: usize) -> OpOutput {
    map_rows(src, 3, |s, out, meta| relative_row(s, out, meta, base_col, cs, ce))
}

/// `reton[ANCHOR]_KIND`: return earned from each column up to `anchor`.
pub fn reton(src: &Array2<f64>, anchor: usize, kind: RetKind, cs: usize, ce: usize) -> OpOutput {
    map_rows(src, RETON_GAPS.len(), |s, mut out, mut meta| {
        let va = s[anchor];
        if va == 0.0 || !va.is_finite() {
            return String::new();
        }
        for c in cs..=ce {
            out[c] = kind.apply(va / s[c], anchor.abs_diff(c));
        }
        let mut parts = Vec::new();
        for (i, (gap, name)) in RETON_GAPS.iter().enumerate() {
            let Some(c) = anchor.checked_sub(*gap) else {
                continue;
            };
            if c < cs || c > ce {
                continue;
            }
            meta[i] = out[c];
            if out[c].is_finite() {
                parts.push(format!("{name}:{:.2}", out[c]));
            }
        }
        parts.join(" ")
    })
}

/// `roll<N>_KIND`: return over the trailing `window` columns at every cell.
///
/// MetaData: `[avg, std, pctBelowMinThreshold, maSharpe, yearsActive]` over
/// the finite cells.
pub fn roll(src: &Array2<f64>, window: usize, kind: RetKind, cs: usize, ce: usize) -> OpOutput {
    map_rows(src, 5, |s, mut out, mut meta| {
        for c in cs.saturating_add(window)..=ce {
            out[c] = kind.apply(s[c] / s[c - window], window);
        }
        let live = out.slice(ndarray::s![cs..=ce]);
        let (n, avg, std) = finite_mean_std(live.iter().copied());
        let below = live
            .iter()
            .filter(|v| v.is_finite() && **v < MIN_THRESHOLD)
            .count();
        let pct_below = if n > 0 {
            below as f64 * 100.0 / n as f64
        } else {
            f64::NAN
        };
        let sharpe = (avg - MIN_THRESHOLD) / std;
        let years = n as f64 / DAYS_PER_YEAR;
        meta[0] = avg;
        meta[1] = std;
        meta[2] = pct_below;
        meta[3] = sharpe;
        meta[4] = years;
        if n == 0 {
            return String::new();
        }
        format!("avg {avg:7.2} std {std:7.2} <{MIN_THRESHOLD}% {pct_below:5.1}% sharpe {sharpe:6.2} {years:5.2}y")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{assert_approx, assert_row, DEFAULT_EPSILON};
    use ndarray::array;

    const NAN: f64 = f64::NAN;

    fn filled_seed() -> Array2<f64> {
        array![[10.0, 10.0, 12.0], [20.0, 22.0, 22.0]]
    }

    #[test]
    fn srel_seed() {
        let out = srel(&filled_seed(), 0, 2);
        assert_row(out.data.row(0), &[0.0, 0.0, 20.0]);
        assert_row(out.data.row(1), &[0.0, 10.0, 10.0]);
        assert_approx(out.meta[[0, 0]], 20.0, DEFAULT_EPSILON);
        assert_approx(out.meta[[0, 2]], 3.0 / 365.0, DEFAULT_EPSILON);
        let retpa = (1.2f64.powf(365.0 / 3.0) - 1.0) * 100.0;
        assert_approx(out.meta[[0, 1]] / retpa, 1.0, 1e-9);
        assert!(!out.labels[0].is_empty());
    }

    #[test]
    fn srel_late_start_is_nan_prefixed() {
        let v = array![[0.0, 0.0, 5.0, 10.0]];
        let out = srel(&v, 0, 3);
        assert_row(out.data.row(0), &[NAN, NAN, 0.0, 100.0]);
        assert_approx(out.meta[[0, 2]], 2.0 / 365.0, DEFAULT_EPSILON);
    }

    #[test]
    fn srel_zero_row_does_not_raise() {
        let v = array![[0.0, 0.0, 0.0]];
        let out = srel(&v, 0, 2);
        assert_row(out.data.row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(out.labels[0], "");
        assert_row(out.meta.row(0), &[0.0, 0.0, 3.0 / 365.0]);
    }

    #[test]
    fn srel_respects_range() {
        let v = array![[10.0, 20.0, 40.0, 80.0]];
        let out = srel(&v, 1, 2);
        assert_row(out.data.row(0), &[NAN, 0.0, 100.0, NAN]);
    }

    #[test]
    fn rel_matches_srel_when_start_is_live() {
        let v = filled_seed();
        let a = srel(&v, 0, 2);
        let b = rel(&v, 0, 0, 2);
        assert_eq!(a.data, b.data);
        assert_eq!(a.meta, b.meta);
    }

    #[test]
    fn rel_has_no_nan_prefix() {
        let v = array![[5.0, 10.0, 20.0]];
        let out = rel(&v, 1, 0, 2);
        assert_row(out.data.row(0), &[-50.0, 0.0, 100.0]);
    }

    #[test]
    fn reton_kinds() {
        let v = array![[50.0, 80.0, 100.0]];
        let out = reton(&v, 2, RetKind::AbsRet, 0, 2);
        assert_row(out.data.row(0), &[100.0, 25.0, 0.0]);
        assert_approx(out.meta[[0, 0]], 25.0, DEFAULT_EPSILON);
        assert!(out.meta[[0, 1]].is_nan());

        let out = reton(&v, 2, RetKind::RetPa, 0, 2);
        let expected = (2.0f64.powf(365.0 / 2.0) - 1.0) * 100.0;
        assert_approx(out.data[[0, 0]] / expected, 1.0, 1e-9);
    }

    #[test]
    fn reton_dead_anchor_is_nan() {
        let v = array![[5.0, 0.0]];
        let out = reton(&v, 1, RetKind::AbsRet, 0, 1);
        assert!(out.data.iter().all(|x| x.is_nan()));
        assert_eq!(out.labels[0], "");
    }

    #[test]
    fn roll_seed() {
        let out = roll(&filled_seed(), 1, RetKind::AbsRet, 0, 2);
        assert_row(out.data.row(0), &[NAN, 0.0, 20.0]);
        assert_row(out.data.row(1), &[NAN, 10.0, 0.0]);
        // A: [0, 20] → avg 10, std 10, one of two below 4%.
        assert_row(out.meta.row(0), &[10.0, 10.0, 50.0, 0.6, 2.0 / 365.0]);
    }

    #[test]
    fn roll_keeps_inf_but_skips_it_in_stats() {
        let v = array![[0.0, 10.0, 11.0]];
        let out = roll(&v, 1, RetKind::AbsRet, 0, 2);
        assert!(out.data[[0, 1]].is_infinite());
        assert_approx(out.meta[[0, 0]], 10.0, DEFAULT_EPSILON);
        assert_approx(out.meta[[0, 4]], 1.0 / 365.0, DEFAULT_EPSILON);
    }
}

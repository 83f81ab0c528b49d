//! Relative Strength Index: `rsi<L>`.
//!
//! Gains and losses of the length-1 diff are simple-averaged over the prior
//! `L` diffs (no Wilder smoothing).
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge cases: avg_loss == 0 → 100; both zero → 50.

use ndarray::Array2;

use super::{map_rows, OpOutput};

/// Default lookback when the operator carries no number.
pub const DEFAULT_LOOKBACK: usize = 14;

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Run `rsi<lookback>` over `[cs, ce]`. The first `lookback` columns of the
/// range are NaN, as is any cell whose window holds a non-finite diff.
///
/// MetaData: `[lastFinite]`.
pub fn rsi(src: &Array2<f64>, lookback: usize, cs: usize, ce: usize) -> OpOutput {
    map_rows(src, 1, |s, mut out, mut meta| {
        if lookback == 0 || ce < cs.saturating_add(lookback) {
            return String::new();
        }
        // diffs[i] is the change into column cs + i; diffs[0] stays NaN.
        let mut diffs = vec![f64::NAN; ce - cs + 1];
        for c in (cs + 1)..=ce {
            diffs[c - cs] = s[c] - s[c - 1];
        }
        for c in (cs + lookback)..=ce {
            let window = &diffs[c - cs + 1 - lookback..=c - cs];
            if window.iter().any(|d| !d.is_finite()) {
                continue;
            }
            let gain: f64 = window.iter().filter(|d| **d > 0.0).sum();
            let loss: f64 = window.iter().filter(|d| **d < 0.0).map(|d| -d).sum();
            out[c] = compute_rsi(gain / lookback as f64, loss / lookback as f64);
        }
        match out.iter().rev().find(|v| v.is_finite()) {
            Some(last) => {
                meta[0] = *last;
                format!("rsi {last:.1}")
            }
            None => String::new(),
        }
    })
}

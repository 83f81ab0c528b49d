//! Moving averages: `mas<N>`, `dma<N>`, `mae<N>`.
//!
//! Any non-finite value inside a window makes that cell NaN. Zero cells
//! (entity not yet alive) are ordinary values here; callers wanting a clean
//! start run the average over a hole-filled `srel` or restrict the range.

use ndarray::{Array2, ArrayView1, ArrayViewMut1};

use super::{finite_ends, map_rows, MaKind, OpOutput};

/// Rolling window over `src[cs..=ce]`. The sum tracks finite values only and
/// a counter tracks the non-finite ones.
///
/// `emit(last_col, mean)` is called for every full window ending at
/// `last_col`, with `mean` NaN when the window holds a non-finite value.
fn rolling_mean(
    src: ArrayView1<'_, f64>,
    window: usize,
    cs: usize,
    ce: usize,
    mut emit: impl FnMut(usize, f64),
) {
    if window == 0 || ce + 1 < cs.saturating_add(window) {
        return;
    }
    let mut sum = 0.0;
    let mut bad = 0usize;
    for c in cs..=ce {
        let entering = src[c];
        if entering.is_finite() {
            sum += entering;
        } else {
            bad += 1;
        }
        if c >= cs + window {
            let leaving = src[c - window];
            if leaving.is_finite() {
                sum -= leaving;
            } else {
                bad -= 1;
            }
        }
        if c + 1 >= cs + window {
            let mean = if bad > 0 { f64::NAN } else { sum / window as f64 };
            emit(c, mean);
        }
    }
}

fn ends_label(out: ArrayView1<'_, f64>, mut meta: ArrayViewMut1<'_, f64>) -> String {
    match finite_ends(out) {
        Some((first, last)) => {
            meta[0] = first;
            meta[1] = last;
            format!("{first:.2} .. {last:.2}")
        }
        None => String::new(),
    }
}

/// Trailing simple average.
pub fn mas(src: &Array2<f64>, window: usize, cs: usize, ce: usize) -> OpOutput {
    map_rows(src, 2, |s, mut out, meta| {
        rolling_mean(s, window, cs, ce, |c, mean| out[c] = mean);
        ends_label(out.view(), meta)
    })
}

/// Centred simple average: the window around `c` starts `window / 2`
/// columns earlier. Both ends of the range stay NaN for `window / 2` columns.
pub fn dma(src: &Array2<f64>, window: usize, cs: usize, ce: usize) -> OpOutput {
    let half = window / 2;
    map_rows(src, 2, |s, mut out, meta| {
        rolling_mean(s, window, cs, ce, |last, mean| {
            let centre = last + 1 + half - window;
            if centre + half <= ce {
                out[centre] = mean;
            }
        });
        ends_label(out.view(), meta)
    })
}

/// Exponential average with `α = 2 / (window + 1)`.
///
/// Seeded with the simple mean of the first `window` consecutive finite
/// values; a later non-finite input leaves its cell NaN and the state as is.
pub fn mae(src: &Array2<f64>, window: usize, cs: usize, ce: usize) -> OpOutput {
    let alpha = 2.0 / (window as f64 + 1.0);
    map_rows(src, 2, |s, mut out, meta| {
        let mut state: Option<f64> = None;
        let mut run = 0usize;
        let mut run_sum = 0.0;
        for c in cs..=ce {
            let v = s[c];
            match state {
                Some(prev) if v.is_finite() => {
                    let next = alpha * v + (1.0 - alpha) * prev;
                    out[c] = next;
                    state = Some(next);
                }
                Some(_) => {}
                None if v.is_finite() => {
                    run += 1;
                    run_sum += v;
                    if run == window {
                        let seed = run_sum / window as f64;
                        out[c] = seed;
                        state = Some(seed);
                    }
                }
                None => {
                    run = 0;
                    run_sum = 0.0;
                }
            }
        }
        ends_label(out.view(), meta)
    })
}

/// Dispatch on the average kind.
pub fn moving_average(
    src: &Array2<f64>,
    window: usize,
    kind: MaKind,
    cs: usize,
    ce: usize,
) -> OpOutput {
    match kind {
        MaKind::Simple => mas(src, window, cs, ce),
        MaKind::Centred => dma(src, window, cs, ce),
        MaKind::Exponential => mae(src, window, cs, ce),
    }
}

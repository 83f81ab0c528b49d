//! Similarity of entities to a reference entity.

use finfools_core::Edb;
use ndarray::ArrayView1;

use crate::error::RankError;

/// `Σ (x−x̄)(r−r̄) / Σ (r−r̄)²` over the columns where both rows are finite.
///
/// NaN when fewer than two columns are shared or `r` does not vary.
pub fn beta_of(x: ArrayView1<'_, f64>, r: ArrayView1<'_, f64>) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(r.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_r = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (cov, var) = pairs.iter().fold((0.0, 0.0), |(cov, var), (a, b)| {
        let dr = b - mean_r;
        (cov + (a - mean_x) * dr, var + dr * dr)
    });
    if var == 0.0 {
        f64::NAN
    } else {
        cov / var
    }
}

/// Beta of each entity in `codes` (every entity when empty) against
/// `ref_code`, read from `key`.
pub fn beta<S: AsRef<str>>(
    edb: &Edb,
    key: &str,
    ref_code: &str,
    codes: &[S],
) -> Result<Vec<(String, f64)>, RankError> {
    let data = edb.data(key)?;
    let reference = data.row(edb.row_of(ref_code)?);
    let targets: Vec<String> = if codes.is_empty() {
        edb.entities().iter().map(|e| e.code.clone()).collect()
    } else {
        codes.iter().map(|c| c.as_ref().to_string()).collect()
    };
    targets
        .into_iter()
        .map(|code| {
            let row = edb.row_of(&code)?;
            let b = beta_of(data.row(row), reference);
            Ok((code, b))
        })
        .collect()
}

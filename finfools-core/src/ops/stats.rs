//! Summary statistics over the finite subset of a series.

/// Count, mean and population standard deviation of the finite values.
/// Mean and std are NaN when nothing is finite.
pub fn finite_mean_std<I: IntoIterator<Item = f64>>(values: I) -> (usize, f64, f64) {
    let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n == 0 {
        return (0, f64::NAN, f64::NAN);
    }
    let mean = finite.iter().sum::<f64>() / n as f64;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (n, mean, var.sqrt())
}

/// Linear-interpolation quantile of an ascending, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Quantile points used by the block statistics.
pub const QUANTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Five-point quantiles of the finite values, or all NaN.
pub fn five_point<I: IntoIterator<Item = f64>>(values: I) -> [f64; 5] {
    let mut finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return [f64::NAN; 5];
    }
    finite.sort_by(f64::total_cmp);
    QUANTILES.map(|q| quantile_sorted(&finite, q))
}

/// Bucket of `x` against ascending `edges`, counting the edges strictly
/// below it. Against its own five-point quantiles a value ranks `0..=4`.
pub fn digitize_right(x: f64, edges: &[f64]) -> usize {
    edges.iter().filter(|&&e| e < x).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::assert_approx;

    #[test]
    fn mean_std_ignores_non_finite() {
        let (n, mean, std) = finite_mean_std([1.0, f64::NAN, 3.0, f64::INFINITY]);
        assert_eq!(n, 2);
        assert_approx(mean, 2.0, 1e-12);
        assert_approx(std, 1.0, 1e-12);
    }

    #[test]
    fn mean_std_empty() {
        let (n, mean, std) = finite_mean_std([f64::NAN]);
        assert_eq!(n, 0);
        assert!(mean.is_nan() && std.is_nan());
    }

    #[test]
    fn quantiles_interpolate() {
        let q = five_point([4.0, 1.0, 3.0, 2.0, f64::NAN]);
        assert_approx(q[0], 1.0, 1e-12);
        assert_approx(q[1], 1.75, 1e-12);
        assert_approx(q[2], 2.5, 1e-12);
        assert_approx(q[3], 3.25, 1e-12);
        assert_approx(q[4], 4.0, 1e-12);
    }

    #[test]
    fn single_value_quantiles() {
        assert_eq!(five_point([7.0]), [7.0; 5]);
    }

    #[test]
    fn digitize_counts_lower_edges() {
        let edges = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(digitize_right(1.0, &edges), 0);
        assert_eq!(digitize_right(1.5, &edges), 1);
        assert_eq!(digitize_right(5.0, &edges), 4);
    }
}

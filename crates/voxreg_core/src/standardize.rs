//! Column-wise z-scoring along the sample axis.
//!
//! All functions add [`STD_EPSILON`] to the standard deviation, so constant
//! columns map to zeros instead of dividing by zero. Standard deviations are
//! population (`ddof = 0`) estimates.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Stabilizer added to every standard deviation.
///
/// Known approximation: near-constant columns are not treated specially,
/// they just get a tiny denominator.
pub const STD_EPSILON: f64 = 1e-6;

/// Per-column mean and population standard deviation of `x`.
///
/// An empty sample axis yields zero means and zero deviations.
pub fn column_stats(x: ArrayView2<f64>) -> (Array1<f64>, Array1<f64>) {
    let n_cols = x.ncols();
    if x.nrows() == 0 {
        return (Array1::zeros(n_cols), Array1::zeros(n_cols));
    }
    let means = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_cols));
    let stds = x.std_axis(Axis(0), 0.0);
    (means, stds)
}

/// Z-score `x` with externally supplied statistics.
///
/// Used to apply train-set statistics to held-out data.
pub fn zscore_with(x: ArrayView2<f64>, means: ArrayView1<f64>, stds: ArrayView1<f64>) -> Array2<f64> {
    let denom = stds.mapv(|s| s + STD_EPSILON);
    (&x - &means) / &denom
}

/// Z-score each column of `x` with its own statistics.
pub fn zscore(x: ArrayView2<f64>) -> Array2<f64> {
    let (means, stds) = column_stats(x);
    zscore_with(x, means.view(), stds.view())
}

/// Z-score a single series.
pub fn zscore_1d(x: ArrayView1<f64>) -> Array1<f64> {
    zscore(x.insert_axis(Axis(1))).column(0).to_owned()
}

//! Per-column Pearson correlation, used both to pick regularization
//! strengths and to score held-out predictions.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{EncodingError, Result};
use crate::standardize::{zscore, zscore_1d};

/// Pearson correlation of each column pair of `a` and `b`.
///
/// Computed as the sample-axis mean of the product of both z-scored inputs,
/// so degenerate columns give small finite values instead of NaN.
pub fn pearsonr(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<Array1<f64>> {
    if a.dim() != b.dim() {
        return Err(EncodingError::ShapeMismatch(format!(
            "cannot correlate {:?} with {:?}",
            a.dim(),
            b.dim()
        )));
    }
    let product = zscore(a) * zscore(b);
    Ok(product
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(a.ncols())))
}

/// Pearson correlation of two series.
pub fn pearsonr_1d(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Result<f64> {
    if a.len() != b.len() {
        return Err(EncodingError::ShapeMismatch(format!(
            "cannot correlate series of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    let product = zscore_1d(a) * zscore_1d(b);
    Ok(product.mean().unwrap_or(0.0))
}

/// Column-wise score between true and predicted targets.
///
/// Higher is better. Implementations must return one value per column.
pub trait Scorer {
    fn score(&self, y_true: ArrayView2<f64>, y_pred: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// The default scorer: [`pearsonr`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PearsonScorer;

impl Scorer for PearsonScorer {
    fn score(&self, y_true: ArrayView2<f64>, y_pred: ArrayView2<f64>) -> Result<Array1<f64>> {
        pearsonr(y_true, y_pred)
    }

    fn name(&self) -> &'static str {
        "pearson"
    }
}

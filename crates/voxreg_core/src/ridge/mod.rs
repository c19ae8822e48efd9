//! Multi-output ridge regression with per-target regularization.
//!
//! Two strategies pick each target's strength from a candidate set:
//! - [`LooRidge`]: exact leave-one-sample-out predictions from the hat matrix
//! - [`BootstrapRidge`]: held-out contiguous chunks over seeded bootstraps
//!
//! Both share the [`spectral`] decomposition of the centred design matrix
//! and both rank candidates with a caller-supplied [`Scorer`].

mod bootstrap;
mod loo;
pub(crate) mod spectral;

pub use bootstrap::BootstrapRidge;
pub use loo::LooRidge;

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{EncodingError, Result};
use crate::scoring::Scorer;

/// Number of default candidates.
pub const DEFAULT_N_ALPHAS: usize = 10;

/// `n` strengths log-spaced between `10^lo` and `10^hi`, inclusive.
pub fn logspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![10f64.powf(lo)],
        _ => (0..n)
            .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / (n - 1) as f64))
            .collect(),
    }
}

/// Ten strengths log-spaced between 10 and 1000.
pub fn default_alphas() -> Vec<f64> {
    logspace(1.0, 3.0, DEFAULT_N_ALPHAS)
}

/// Reject empty, negative and non-finite candidate sets.
pub fn validate_alphas(alphas: &[f64]) -> Result<()> {
    if alphas.is_empty() {
        return Err(EncodingError::EmptyAlphas);
    }
    if let Some(&bad) = alphas.iter().find(|a| !a.is_finite() || **a < 0.0) {
        return Err(EncodingError::InvalidAlpha(bad));
    }
    Ok(())
}

/// A fitted multi-output linear model.
#[derive(Clone, Debug)]
pub struct RidgeFit {
    /// Coefficients, shape (features, targets)
    pub coef: Array2<f64>,
    /// One intercept per target
    pub intercept: Array1<f64>,
    /// Chosen strength per target
    pub alphas: Array1<f64>,
}

impl RidgeFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array2<f64> {
        x.dot(&self.coef) + &self.intercept
    }
}

/// Pluggable ridge strategy.
///
/// Implementations choose one strength per target column, independently,
/// and must be deterministic for fixed inputs.
pub trait RidgeFitter {
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        alphas: &[f64],
        scorer: &dyn Scorer,
    ) -> Result<RidgeFit>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Index of the best candidate per target column of `scores`
/// (rows are candidates). NaN never wins; ties keep the earliest row.
pub(crate) fn best_per_target(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .axis_iter(Axis(1))
        .map(|column| {
            let mut best = 0;
            let mut best_score = f64::NEG_INFINITY;
            for (i, &s) in column.iter().enumerate() {
                if s > best_score {
                    best = i;
                    best_score = s;
                }
            }
            best
        })
        .collect()
}

pub(crate) fn check_training_shapes(x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<()> {
    if x.nrows() != y.nrows() {
        return Err(EncodingError::ShapeMismatch(format!(
            "design has {} rows but targets have {}",
            x.nrows(),
            y.nrows()
        )));
    }
    if x.nrows() < 2 {
        return Err(EncodingError::ShapeMismatch(format!(
            "need at least 2 training samples, got {}",
            x.nrows()
        )));
    }
    Ok(())
}

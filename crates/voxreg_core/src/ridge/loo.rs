use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::debug;

use super::spectral::Spectral;
use super::{best_per_target, check_training_shapes, validate_alphas, RidgeFit, RidgeFitter};
use crate::error::Result;
use crate::scoring::Scorer;

/// Floor on `1 - h_ii` so a sample with full leverage cannot divide by zero.
const MIN_RESIDUAL_SCALE: f64 = 1e-12;

/// Ridge with per-target strengths chosen by generalized (leave-one-sample-out)
/// cross-validation.
///
/// For every candidate the exact leave-one-out prediction of each sample is
/// `y_i - (y_i - ŷ_i) / (1 - h_ii)`; the scorer compares those predictions
/// with the targets column by column.
#[derive(Clone, Debug, Default)]
pub struct LooRidge;

impl LooRidge {
    pub fn new() -> Self {
        Self
    }

    /// Leave-one-out predictions for a single strength.
    fn loo_predictions(spectral: &Spectral, y: ArrayView2<f64>, alpha: f64) -> Array2<f64> {
        let shrink = spectral.shrinkage(alpha);
        let fitted = spectral.fitted_centered(&shrink);
        let scale: Array1<f64> = spectral
            .leverage(&shrink)
            .mapv(|h| (1.0 - h).max(MIN_RESIDUAL_SCALE));
        let residuals = (&spectral.y_centered - &fitted) / &scale.insert_axis(Axis(1));
        &y - &residuals
    }
}

impl RidgeFitter for LooRidge {
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        alphas: &[f64],
        scorer: &dyn Scorer,
    ) -> Result<RidgeFit> {
        validate_alphas(alphas)?;
        check_training_shapes(x, y)?;

        let spectral = Spectral::new(x, y);
        let mut scores = Array2::zeros((alphas.len(), y.ncols()));
        for (i, &alpha) in alphas.iter().enumerate() {
            let predictions = Self::loo_predictions(&spectral, y, alpha);
            let alpha_scores = scorer.score(y, predictions.view())?;
            debug!(
                alpha = alpha,
                mean_score = alpha_scores.mean().unwrap_or(f64::NAN),
                "loo candidate scored"
            );
            scores.row_mut(i).assign(&alpha_scores);
        }

        let best = best_per_target(&scores);
        let coef = spectral.coefficients(alphas, &best);
        let intercept = spectral.intercept(&coef);
        let chosen = best.iter().map(|&i| alphas[i]).collect::<Array1<f64>>();

        Ok(RidgeFit {
            coef,
            intercept,
            alphas: chosen,
        })
    }

    fn name(&self) -> &'static str {
        "ridge-cv"
    }
}

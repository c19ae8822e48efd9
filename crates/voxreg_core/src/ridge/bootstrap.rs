use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::spectral::Spectral;
use super::{best_per_target, check_training_shapes, validate_alphas, RidgeFit, RidgeFitter};
use crate::error::Result;
use crate::scoring::Scorer;

/// Ridge with per-target strengths chosen on held-out contiguous chunks.
///
/// Each bootstrap holds out a random set of `chunk_len`-sample chunks
/// (about `holdout_fraction` of the data), fits on the remainder and scores
/// every candidate on the held-out rows. Scores are averaged over
/// bootstraps before each target picks its strength; the final model is
/// refit on all samples. Chunks keep temporally autocorrelated samples
/// together on one side of the split.
#[derive(Clone, Debug)]
pub struct BootstrapRidge {
    pub n_boots: usize,
    pub chunk_len: usize,
    pub holdout_fraction: f64,
    pub seed: u64,
}

impl Default for BootstrapRidge {
    fn default() -> Self {
        Self {
            n_boots: 15,
            chunk_len: 40,
            holdout_fraction: 0.2,
            seed: 0,
        }
    }
}

impl BootstrapRidge {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Contiguous chunk boundaries for `n` samples. Chunks shrink for short
    /// inputs so there are always at least two of them.
    fn chunks(&self, n: usize) -> Vec<(usize, usize)> {
        let len = self.chunk_len.min((n / 5).max(1)).max(1);
        (0..n).step_by(len).map(|start| (start, (start + len).min(n))).collect()
    }

    fn n_held_out(&self, n_chunks: usize) -> usize {
        let wanted = (n_chunks as f64 * self.holdout_fraction).round() as usize;
        wanted.clamp(1, n_chunks.saturating_sub(1).max(1))
    }
}

impl RidgeFitter for BootstrapRidge {
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        alphas: &[f64],
        scorer: &dyn Scorer,
    ) -> Result<RidgeFit> {
        validate_alphas(alphas)?;
        check_training_shapes(x, y)?;

        let chunks = self.chunks(x.nrows());
        let n_held = self.n_held_out(chunks.len());
        let n_boots = self.n_boots.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..chunks.len()).collect();
        let mut totals = Array2::<f64>::zeros((alphas.len(), y.ncols()));

        for boot in 0..n_boots {
            order.shuffle(&mut rng);
            let mut held_chunks = order[..n_held].to_vec();
            held_chunks.sort_unstable();

            let mut is_held = vec![false; x.nrows()];
            for &c in &held_chunks {
                let (start, end) = chunks[c];
                is_held[start..end].iter_mut().for_each(|h| *h = true);
            }
            let held: Vec<usize> = (0..x.nrows()).filter(|&i| is_held[i]).collect();
            let kept: Vec<usize> = (0..x.nrows()).filter(|&i| !is_held[i]).collect();

            let spectral = Spectral::new(
                x.select(Axis(0), &kept).view(),
                y.select(Axis(0), &kept).view(),
            );
            let projected = spectral.project(x.select(Axis(0), &held).view());
            let y_held = y.select(Axis(0), &held);

            for (i, &alpha) in alphas.iter().enumerate() {
                let prediction = spectral.predict_projected(&projected, &spectral.shrinkage(alpha));
                let alpha_scores = scorer.score(y_held.view(), prediction.view())?;
                let mut row = totals.row_mut(i);
                row += &alpha_scores;
            }
            debug!(boot = boot, held_out = held.len(), "bootstrap scored");
        }

        let mean_scores = totals / n_boots as f64;
        let best = best_per_target(&mean_scores);

        let spectral = Spectral::new(x, y);
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
        "ridge-huth"
    }
}

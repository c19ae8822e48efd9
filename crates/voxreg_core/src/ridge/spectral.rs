//! Eigendecomposition of the centred Gram matrix, shared by both ridge
//! strategies. With `Xc = X - mean(X)` and `XcᵀXc = V Λ Vᵀ`, the ridge
//! solution for strength `a` is `V diag(1 / (λ + a)) Vᵀ Xcᵀ Yc`, so every
//! candidate costs one diagonal rescale instead of a new solve.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Shrinkage factors below this are treated as a null direction.
const NULL_DIRECTION: f64 = 1e-12;

pub(crate) struct Spectral {
    pub x_mean: Array1<f64>,
    pub y_mean: Array1<f64>,
    /// Λ, clamped at zero
    pub eigvals: Array1<f64>,
    /// V, eigenvectors as columns
    pub eigvecs: Array2<f64>,
    /// Xc V, shape (samples, features)
    pub projected: Array2<f64>,
    /// Vᵀ Xcᵀ Yc, shape (features, targets)
    pub rotated: Array2<f64>,
    pub y_centered: Array2<f64>,
}

impl Spectral {
    pub fn new(x: ArrayView2<f64>, y: ArrayView2<f64>) -> Self {
        let x_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(y.ncols()));
        let xc = &x - &x_mean;
        let yc = &y - &y_mean;

        let gram = xc.t().dot(&xc);
        let p = gram.nrows();
        let eig = SymmetricEigen::new(DMatrix::from_fn(p, p, |i, j| gram[[i, j]]));
        let eigvals = Array1::from_shape_fn(p, |k| eig.eigenvalues[k].max(0.0));
        let eigvecs = Array2::from_shape_fn((p, p), |(i, j)| eig.eigenvectors[(i, j)]);

        let projected = xc.dot(&eigvecs);
        let rotated = projected.t().dot(&yc);

        Self {
            x_mean,
            y_mean,
            eigvals,
            eigvecs,
            projected,
            rotated,
            y_centered: yc,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.projected.nrows()
    }

    /// `1 / (λ + a)` per direction, zero where the direction is null.
    pub fn shrinkage(&self, alpha: f64) -> Array1<f64> {
        self.eigvals.mapv(|l| {
            let denom = l + alpha;
            if denom > NULL_DIRECTION {
                1.0 / denom
            } else {
                0.0
            }
        })
    }

    /// `diag(d) Vᵀ Xcᵀ Yc` restricted to `targets` (all when `None`).
    fn scaled_rotated(&self, shrink: &Array1<f64>, targets: Option<&[usize]>) -> Array2<f64> {
        let d = shrink.view().insert_axis(Axis(1));
        match targets {
            Some(cols) => &self.rotated.select(Axis(1), cols) * &d,
            None => &self.rotated * &d,
        }
    }

    /// Centred in-sample predictions for one strength.
    pub fn fitted_centered(&self, shrink: &Array1<f64>) -> Array2<f64> {
        self.projected.dot(&self.scaled_rotated(shrink, None))
    }

    /// Diagonal of the hat matrix, including the intercept's `1/n`.
    pub fn leverage(&self, shrink: &Array1<f64>) -> Array1<f64> {
        let n = self.n_samples() as f64;
        self.projected.mapv(|q| q * q).dot(shrink) + 1.0 / n
    }

    /// Project held-out rows onto the eigenbasis.
    pub fn project(&self, x: ArrayView2<f64>) -> Array2<f64> {
        (&x - &self.x_mean).dot(&self.eigvecs)
    }

    /// Predictions for rows already passed through [`Spectral::project`].
    pub fn predict_projected(&self, projected: &Array2<f64>, shrink: &Array1<f64>) -> Array2<f64> {
        projected.dot(&self.scaled_rotated(shrink, None)) + &self.y_mean
    }

    /// Coefficients with a separate strength per target.
    pub fn coefficients(&self, alphas: &[f64], per_target: &[usize]) -> Array2<f64> {
        let n_targets = self.rotated.ncols();
        let mut coef = Array2::zeros((self.eigvecs.nrows(), n_targets));
        for (a, &alpha) in alphas.iter().enumerate() {
            let targets: Vec<usize> = (0..n_targets).filter(|&j| per_target[j] == a).collect();
            if targets.is_empty() {
                continue;
            }
            let shrink = self.shrinkage(alpha);
            let block = self.eigvecs.dot(&self.scaled_rotated(&shrink, Some(&targets)));
            for (col, &j) in targets.iter().enumerate() {
                coef.column_mut(j).assign(&block.column(col));
            }
        }
        coef
    }

    pub fn intercept(&self, coef: &Array2<f64>) -> Array1<f64> {
        &self.y_mean - &self.x_mean.dot(coef)
    }
}

//! Single-split ridge regression over stories.
//!
//! Train and test stories are concatenated in the given order, the design
//! matrices are normalized with statistics from the train rows only, and a
//! [`RidgeFitter`] picks one strength per response column before the test
//! rows are scored.

use std::collections::{BTreeSet, HashMap};

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use tracing::{debug, warn};

use crate::error::{EncodingError, MatrixKind, Result};
use crate::loader::check_same_stories;
use crate::ridge::{default_alphas, validate_alphas, LooRidge, RidgeFitter};
use crate::scoring::Scorer;
use crate::standardize::{column_stats, zscore_with};

/// Per-story matrices keyed by story name.
pub type StoryMatrices = HashMap<String, Array2<f64>>;

/// Concatenated rows for one train/test split.
#[derive(Clone, Debug)]
pub struct SplitData {
    pub x_train: Array2<f64>,
    pub y_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array2<f64>,
}

impl SplitData {
    /// Stack the matrices of `train` and `test` stories row-wise.
    ///
    /// Fails on an empty side, an overlap between sides, a story missing
    /// from either map, or a row-count mismatch within a story.
    pub fn assemble(
        train: &[String],
        test: &[String],
        features: &StoryMatrices,
        responses: &StoryMatrices,
    ) -> Result<Self> {
        if train.is_empty() {
            return Err(EncodingError::EmptyPartition("train"));
        }
        if test.is_empty() {
            return Err(EncodingError::EmptyPartition("test"));
        }
        let train_set: BTreeSet<&str> = train.iter().map(String::as_str).collect();
        if let Some(story) = test.iter().find(|s| train_set.contains(s.as_str())) {
            return Err(EncodingError::OverlappingPartition(story.clone()));
        }

        let (x_train, y_train) = stack(train, features, responses)?;
        let (x_test, y_test) = stack(test, features, responses)?;
        if x_train.ncols() != x_test.ncols() || y_train.ncols() != y_test.ncols() {
            return Err(EncodingError::ShapeMismatch(format!(
                "train is {}x{} -> {} but test is {}x{} -> {}",
                x_train.nrows(),
                x_train.ncols(),
                y_train.ncols(),
                x_test.nrows(),
                x_test.ncols(),
                y_test.ncols()
            )));
        }

        Ok(Self {
            x_train,
            y_train,
            x_test,
            y_test,
        })
    }
}

fn lookup<'a>(map: &'a StoryMatrices, story: &str, kind: MatrixKind) -> Result<ArrayView2<'a, f64>> {
    map.get(story)
        .map(|m| m.view())
        .ok_or_else(|| EncodingError::MissingStory {
            story: story.to_string(),
            kind,
        })
}

fn stack(
    stories: &[String],
    features: &StoryMatrices,
    responses: &StoryMatrices,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let mut xs = Vec::with_capacity(stories.len());
    let mut ys = Vec::with_capacity(stories.len());
    for story in stories {
        let x = lookup(features, story, MatrixKind::Features)?;
        let y = lookup(responses, story, MatrixKind::Responses)?;
        if x.nrows() != y.nrows() {
            return Err(EncodingError::RowMismatch {
                story: story.clone(),
                feature_rows: x.nrows(),
                response_rows: y.nrows(),
            });
        }
        xs.push(x);
        ys.push(y);
    }
    let x = concatenate(Axis(0), &xs)
        .map_err(|e| EncodingError::ShapeMismatch(format!("feature columns differ across stories: {}", e)))?;
    let y = concatenate(Axis(0), &ys)
        .map_err(|e| EncodingError::ShapeMismatch(format!("response columns differ across stories: {}", e)))?;
    Ok((x, y))
}

/// Result of one train/test split.
#[derive(Clone, Debug)]
pub struct RegressionOutcome {
    /// Test score per response column
    pub scores: Array1<f64>,
    /// Coefficients, shape (features, response columns)
    pub weights: Array2<f64>,
    /// Chosen strength per response column
    pub best_alphas: Array1<f64>,
    /// Feature means of the train rows
    pub train_mean: Array1<f64>,
    /// Feature standard deviations of the train rows
    pub train_std: Array1<f64>,
}

/// Normalizes, fits and scores one split.
pub struct Regressor {
    alphas: Vec<f64>,
    fitter: Box<dyn RidgeFitter>,
}

impl Regressor {
    pub fn new(alphas: Vec<f64>, fitter: Box<dyn RidgeFitter>) -> Result<Self> {
        validate_alphas(&alphas)?;
        Ok(Self { alphas, fitter })
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    pub fn fitter_name(&self) -> &'static str {
        self.fitter.name()
    }

    /// Fit on the train rows of `split` and score its test rows.
    pub fn fit_split(&self, split: &SplitData, scorer: &dyn Scorer) -> Result<RegressionOutcome> {
        let (train_mean, train_std) = column_stats(split.x_train.view());
        let flat = train_std.iter().filter(|s| **s == 0.0).count();
        if flat > 0 {
            warn!(columns = flat, "zero-variance feature columns in training data");
        }

        let x_train = zscore_with(split.x_train.view(), train_mean.view(), train_std.view());
        let x_test = zscore_with(split.x_test.view(), train_mean.view(), train_std.view());

        let fit = self
            .fitter
            .fit(x_train.view(), split.y_train.view(), &self.alphas, scorer)?;
        let prediction = fit.predict(x_test.view());
        let scores = scorer.score(split.y_test.view(), prediction.view())?;

        debug!(
            fitter = self.fitter.name(),
            train_rows = x_train.nrows(),
            test_rows = x_test.nrows(),
            mean_score = scores.mean().unwrap_or(f64::NAN),
            "split fitted"
        );

        Ok(RegressionOutcome {
            scores,
            weights: fit.coef,
            best_alphas: fit.alphas,
            train_mean,
            train_std,
        })
    }

    /// Assemble the split from story maps, then [`Regressor::fit_split`].
    ///
    /// Both maps must be keyed by the same stories.
    pub fn run(
        &self,
        train: &[String],
        test: &[String],
        features: &StoryMatrices,
        responses: &StoryMatrices,
        scorer: &dyn Scorer,
    ) -> Result<RegressionOutcome> {
        check_same_stories(features, responses)?;
        let split = SplitData::assemble(train, test, features, responses)?;
        self.fit_split(&split, scorer)
    }
}

/// Ridge regression on one split with leave-one-out strength selection.
///
/// `alphas` defaults to ten values log-spaced between 10 and 1000.
pub fn ridge_regression(
    train: &[String],
    test: &[String],
    features: &StoryMatrices,
    responses: &StoryMatrices,
    scorer: &dyn Scorer,
    alphas: Option<Vec<f64>>,
) -> Result<RegressionOutcome> {
    let regressor = Regressor::new(alphas.unwrap_or_else(default_alphas), Box::new(LooRidge::new()))?;
    regressor.run(train, test, features, responses, scorer)
}

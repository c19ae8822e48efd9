//! Cross-validation driver: partition generation, shuffle control and the
//! reduction of per-partition scores.

use ndarray::{stack, Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CrossValidation;
use crate::error::{EncodingError, Result};
use crate::loader::StoryStore;
use crate::regression::{RegressionOutcome, Regressor, SplitData};
use crate::scoring::Scorer;

/// Stream of the seeded generator reserved for shuffle control, so shuffling
/// never perturbs partition sampling.
const SHUFFLE_STREAM: u64 = 1;

/// One train/test split of the story pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub train: Vec<String>,
    pub test: Vec<String>,
}

impl Partition {
    /// Train stories followed by test stories.
    pub fn stories(&self) -> Vec<String> {
        self.train.iter().chain(self.test.iter()).cloned().collect()
    }
}

/// One partition per story, each holding that story out, in list order.
pub fn leave_one_out(stories: &[String]) -> Vec<Partition> {
    (0..stories.len())
        .map(|held| Partition {
            train: stories
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != held)
                .map(|(_, s)| s.clone())
                .collect(),
            test: vec![stories[held].clone()],
        })
        .collect()
}

/// Draw one random partition with `n_train` training stories.
///
/// With `test_story` pinned the test set is exactly that story; otherwise
/// `n_test` test stories are drawn along with the training stories.
pub fn sample_partition<R: Rng + ?Sized>(
    pool: &[String],
    n_train: usize,
    test_story: Option<&str>,
    n_test: usize,
    rng: &mut R,
) -> Result<Partition> {
    if n_train == 0 {
        return Err(EncodingError::EmptyPartition("train"));
    }
    match test_story {
        Some(test) => {
            if !pool.iter().any(|s| s == test) {
                return Err(EncodingError::UnknownTestStory(test.to_string()));
            }
            let mut rest: Vec<&String> = pool.iter().filter(|s| s.as_str() != test).collect();
            if n_train > rest.len() {
                return Err(EncodingError::TrainSizeTooLarge {
                    requested: n_train,
                    available: rest.len(),
                });
            }
            rest.shuffle(rng);
            Ok(Partition {
                train: rest[..n_train].iter().map(|s| s.to_string()).collect(),
                test: vec![test.to_string()],
            })
        }
        None => {
            let n_test = n_test.max(1);
            if n_train + n_test > pool.len() {
                return Err(EncodingError::TrainSizeTooLarge {
                    requested: n_train,
                    available: pool.len().saturating_sub(n_test),
                });
            }
            let drawn: Vec<&String> = pool.choose_multiple(rng, n_train + n_test).collect();
            Ok(Partition {
                test: drawn[..n_test].iter().map(|s| s.to_string()).collect(),
                train: drawn[n_test..].iter().map(|s| s.to_string()).collect(),
            })
        }
    }
}

/// `n_repeats` independent draws of [`sample_partition`].
pub fn sample_partitions<R: Rng + ?Sized>(
    pool: &[String],
    n_train: usize,
    n_repeats: usize,
    test_story: Option<&str>,
    n_test: usize,
    rng: &mut R,
) -> Result<Vec<Partition>> {
    (0..n_repeats)
        .map(|_| sample_partition(pool, n_train, test_story, n_test, &mut *rng))
        .collect()
}

/// Rows of `x` in a random order.
pub fn shuffle_rows<R: Rng + ?Sized>(x: &Array2<f64>, rng: &mut R) -> Array2<f64> {
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.shuffle(rng);
    x.select(Axis(0), &order)
}

/// Column-wise mean and standard error across partitions.
///
/// The standard error uses the sample standard deviation (`ddof = 1`) and
/// is zero when there is a single partition.
pub fn summarize(scores: &[Array1<f64>]) -> Result<(Array1<f64>, Array1<f64>)> {
    if scores.is_empty() {
        return Err(EncodingError::NoPartitions);
    }
    let views: Vec<ArrayView1<f64>> = scores.iter().map(|s| s.view()).collect();
    let stacked = stack(Axis(0), &views)
        .map_err(|e| EncodingError::ShapeMismatch(format!("fold score lengths differ: {}", e)))?;
    let n = stacked.nrows();
    let mean = stacked
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(stacked.ncols()));
    let sem = if n < 2 {
        Array1::zeros(stacked.ncols())
    } else {
        stacked.std_axis(Axis(0), 1.0) / (n as f64).sqrt()
    };
    Ok((mean, sem))
}

/// What to cross-validate over.
#[derive(Debug, Clone)]
pub struct CvPlan {
    pub policy: CrossValidation,
    /// Ordered story pool
    pub stories: Vec<String>,
    pub n_train: usize,
    /// Draws under the sampling policy; ignored by leave-one-out
    pub n_repeats: usize,
    pub test_story: Option<String>,
    pub n_test: usize,
}

impl CvPlan {
    /// Generate the partitions of this plan.
    ///
    /// Leave-one-out runs over the first `n_train + 1` stories so that every
    /// fold trains on `n_train` stories.
    pub fn partitions<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Partition>> {
        match self.policy {
            CrossValidation::Loocv => {
                if self.n_train == 0 {
                    return Err(EncodingError::EmptyPartition("train"));
                }
                if self.n_train + 1 > self.stories.len() {
                    return Err(EncodingError::TrainSizeTooLarge {
                        requested: self.n_train,
                        available: self.stories.len().saturating_sub(1),
                    });
                }
                Ok(leave_one_out(&self.stories[..self.n_train + 1]))
            }
            CrossValidation::Simple => sample_partitions(
                &self.stories,
                self.n_train,
                self.n_repeats,
                self.test_story.as_deref(),
                self.n_test,
                rng,
            ),
        }
    }
}

/// Receives each partition's outcome as soon as it is computed.
pub trait FoldSink {
    fn record(&mut self, fold: usize, partition: &Partition, outcome: &RegressionOutcome) -> Result<()>;
}

/// Sink that keeps nothing.
#[derive(Debug, Default)]
pub struct DiscardFolds;

impl FoldSink for DiscardFolds {
    fn record(&mut self, _fold: usize, _partition: &Partition, _outcome: &RegressionOutcome) -> Result<()> {
        Ok(())
    }
}

/// Reduced scores of one cross-validation run.
#[derive(Debug, Clone)]
pub struct CvSummary {
    pub mean: Array1<f64>,
    pub sem: Array1<f64>,
    /// Score vector of every partition, in partition order
    pub fold_scores: Vec<Array1<f64>>,
}

impl CvSummary {
    pub fn n_folds(&self) -> usize {
        self.fold_scores.len()
    }

    /// Largest mean score over response columns, ignoring NaN.
    pub fn max_mean(&self) -> f64 {
        self.mean
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::NAN, f64::max)
    }
}

/// Runs the regressor over every partition of a plan.
pub struct CrossValidator<'r> {
    regressor: &'r Regressor,
    scorer: &'r dyn Scorer,
    shuffle: bool,
    seed: u64,
}

impl<'r> CrossValidator<'r> {
    pub fn new(regressor: &'r Regressor, scorer: &'r dyn Scorer, shuffle: bool, seed: u64) -> Self {
        Self {
            regressor,
            scorer,
            shuffle,
            seed,
        }
    }

    pub fn run(&self, plan: &CvPlan, store: &mut StoryStore<'_>, sink: &mut dyn FoldSink) -> Result<CvSummary> {
        let mut partition_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut shuffle_rng = ChaCha8Rng::seed_from_u64(self.seed);
        shuffle_rng.set_stream(SHUFFLE_STREAM);

        let partitions = plan.partitions(&mut partition_rng)?;
        if partitions.is_empty() {
            return Err(EncodingError::NoPartitions);
        }

        let mut fold_scores = Vec::with_capacity(partitions.len());
        for (fold, partition) in partitions.iter().enumerate() {
            let outcome = store.with_stories(&partition.stories(), |features, responses| {
                let mut split = SplitData::assemble(&partition.train, &partition.test, features, responses)?;
                if self.shuffle {
                    split.x_train = shuffle_rows(&split.x_train, &mut shuffle_rng);
                }
                self.regressor.fit_split(&split, self.scorer)
            })?;

            info!(
                fold = fold,
                test = ?partition.test,
                n_train = partition.train.len(),
                shuffled = self.shuffle,
                mean_score = outcome.scores.mean().unwrap_or(f64::NAN),
                "fold complete"
            );
            sink.record(fold, partition, &outcome)?;
            fold_scores.push(outcome.scores);
        }

        let (mean, sem) = summarize(&fold_scores)?;
        Ok(CvSummary {
            mean,
            sem,
            fold_scores,
        })
    }
}

//! Grid sweep over predictor × subject × train size × shuffle state.
//!
//! Every cell runs one cross-validation, writes its score arrays under a
//! directory derived from its coordinates and folds its best mean score
//! into the run's [`ResultsSummary`], which is persisted before the next
//! cell starts.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{CrossValidation, Predictor, ResolvedParams, ShuffleState};
use crate::crossval::{CrossValidator, CvPlan, CvSummary, FoldSink, Partition};
use crate::error::Result;
use crate::loader::{StoryLoader, StoryStore};
use crate::persist::{ensure_dir, write_json, write_npy};
use crate::regression::{RegressionOutcome, Regressor};
use crate::ridge::default_alphas;
use crate::scoring::{PearsonScorer, Scorer};
use crate::summary::{ResultsSummary, SummaryKey};

pub const PARAMS_FILE: &str = "params.json";
pub const SUMMARY_FILE: &str = "results_max.json";
pub const SCORES_MEAN_FILE: &str = "scores_mean.npy";
pub const SCORES_SEM_FILE: &str = "scores_sem.npy";

/// One combination of the sweep grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    /// Position in grid order; `--resume-from` counts these
    pub index: usize,
    pub predictor: Predictor,
    pub subject: String,
    pub n_train_stories: usize,
    pub shuffle: ShuffleState,
}

impl GridCell {
    pub fn key(&self) -> SummaryKey {
        SummaryKey {
            predictor: self.predictor,
            subject: self.subject.clone(),
            n_train_stories: self.n_train_stories,
            shuffle: self.shuffle,
        }
    }

    /// `{run}/{subject}/{predictor}/{n_train}/{shuffle state}`
    pub fn output_dir(&self, run_folder: &Path) -> PathBuf {
        run_folder
            .join(&self.subject)
            .join(self.predictor.as_str())
            .join(self.n_train_stories.to_string())
            .join(self.shuffle.as_str())
    }

    /// Seed of this cell's partition, shuffle and bootstrap streams.
    ///
    /// The shuffle state is left out so a shuffled cell sees the same
    /// partitions as its unshuffled twin.
    pub fn seed(&self, base: u64) -> u64 {
        let mut h = splitmix64(base);
        h = splitmix64(h ^ self.predictor as u64);
        for byte in self.subject.bytes() {
            h = splitmix64(h ^ byte as u64);
        }
        splitmix64(h ^ self.n_train_stories as u64)
    }
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Every cell of the grid in sweep order: predictor, then subject, then
/// train size, then shuffle state, each axis in the order given.
pub fn grid(params: &ResolvedParams) -> Vec<GridCell> {
    let mut cells = Vec::new();
    for &predictor in &params.predictors {
        for subject in &params.subjects {
            for &n_train_stories in &params.n_train_stories {
                for &shuffle in &params.shuffle_opts {
                    cells.push(GridCell {
                        index: cells.len(),
                        predictor,
                        subject: subject.clone(),
                        n_train_stories,
                        shuffle,
                    });
                }
            }
        }
    }
    cells
}

/// Writes each fold's arrays and partition to `fold_{i}/` under a cell.
struct FoldWriter {
    dir: PathBuf,
}

impl FoldSink for FoldWriter {
    fn record(&mut self, fold: usize, partition: &Partition, outcome: &RegressionOutcome) -> Result<()> {
        let dir = self.dir.join(format!("fold_{}", fold));
        ensure_dir(&dir)?;
        write_npy(&dir.join("scores.npy"), &outcome.scores)?;
        write_npy(&dir.join("weights.npy"), &outcome.weights)?;
        write_npy(&dir.join("best_alphas.npy"), &outcome.best_alphas)?;
        write_json(&dir.join("partition.json"), partition)
    }
}

pub struct Sweep<'a> {
    params: &'a ResolvedParams,
    loader: &'a dyn StoryLoader,
    run_folder: PathBuf,
    alphas: Vec<f64>,
    scorer: Box<dyn Scorer>,
}

impl<'a> Sweep<'a> {
    pub fn new(params: &'a ResolvedParams, loader: &'a dyn StoryLoader, run_folder: impl Into<PathBuf>) -> Self {
        Self {
            params,
            loader,
            run_folder: run_folder.into(),
            alphas: default_alphas(),
            scorer: Box::new(PearsonScorer),
        }
    }

    pub fn with_alphas(mut self, alphas: Vec<f64>) -> Self {
        self.alphas = alphas;
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn run_folder(&self) -> &Path {
        &self.run_folder
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_folder.join(SUMMARY_FILE)
    }

    pub fn cells(&self) -> Vec<GridCell> {
        grid(self.params)
    }

    pub fn run(&self) -> Result<ResultsSummary> {
        self.run_with(|_, _| {})
    }

    /// Parameters this session runs with.
    ///
    /// A fresh run records its parameters in `params.json`. A resumed run
    /// keeps that record and continues with its seed; see
    /// [`ResolvedParams::continue_run`].
    fn session_params(&self) -> Result<ResolvedParams> {
        let path = self.run_folder.join(PARAMS_FILE);
        if self.params.resume_from > 0 && path.exists() {
            let recorded = ResolvedParams::load(&path)?;
            return self.params.continue_run(&recorded);
        }
        write_json(&path, self.params)?;
        Ok(self.params.clone())
    }

    /// Run every remaining cell, calling `on_cell` once a cell's results
    /// and the summary file are on disk.
    pub fn run_with(&self, mut on_cell: impl FnMut(&GridCell, &ResultsSummary)) -> Result<ResultsSummary> {
        ensure_dir(&self.run_folder)?;
        let params = self.session_params()?;

        let summary_path = self.summary_path();
        let mut summary = if params.resume_from > 0 && summary_path.exists() {
            ResultsSummary::load(&summary_path)?
        } else {
            ResultsSummary::new()
        };

        let cells = grid(&params);
        info!(
            run_folder = %self.run_folder.display(),
            cells = cells.len(),
            resume_from = params.resume_from,
            seed = params.seed,
            fitter = ?params.ridge_implementation,
            "starting sweep"
        );

        for cell in cells.iter().skip(params.resume_from) {
            let result = self.run_cell_with(&params, cell)?;
            let max_mean = result.max_mean();
            // a rerun cell replaces whatever an earlier session left behind
            summary.insert(cell.key(), max_mean);
            summary.persist(&summary_path)?;

            info!(
                cell = cell.index,
                total = cells.len(),
                predictor = cell.predictor.as_str(),
                subject = %cell.subject,
                n_train_stories = cell.n_train_stories,
                shuffle = cell.shuffle.as_str(),
                folds = result.n_folds(),
                max_mean_score = max_mean,
                "cell complete"
            );
            on_cell(cell, &summary);
        }
        Ok(summary)
    }

    /// Cross-validate one cell and write its arrays. The summary is left
    /// to the caller.
    pub fn run_cell(&self, cell: &GridCell) -> Result<CvSummary> {
        self.run_cell_with(self.params, cell)
    }

    fn run_cell_with(&self, params: &ResolvedParams, cell: &GridCell) -> Result<CvSummary> {
        let dir = cell.output_dir(&self.run_folder);
        ensure_dir(&dir)?;

        let seed = cell.seed(params.seed);
        let regressor = Regressor::new(self.alphas.clone(), params.ridge_implementation.create_fitter(seed))?;
        let validator = CrossValidator::new(&regressor, self.scorer.as_ref(), cell.shuffle.is_shuffled(), seed);

        let keep = params.cross_validation == CrossValidation::Loocv || params.keep_train_stories_in_mem;
        let mut store = StoryStore::new(self.loader, cell.predictor, &cell.subject, keep);

        let plan = CvPlan {
            policy: params.cross_validation,
            stories: params.stories.clone(),
            n_train: cell.n_train_stories,
            n_repeats: params.n_repeats,
            test_story: params.test_story.clone(),
            n_test: params.n_test_stories,
        };
        let mut sink = FoldWriter { dir: dir.clone() };
        let result = validator.run(&plan, &mut store, &mut sink)?;

        write_npy(&dir.join(SCORES_MEAN_FILE), &result.mean)?;
        write_npy(&dir.join(SCORES_SEM_FILE), &result.sem)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataConfig, ExperimentParams, PredictorChoice};

    fn params(do_shuffle: bool) -> ResolvedParams {
        let data = DataConfig {
            stories: vec!["a".into(), "b".into(), "c".into()],
            ..DataConfig::default()
        };
        ExperimentParams {
            predictor: vec![PredictorChoice::All],
            subject: vec!["UTS01".into(), "UTS02".into()],
            n_train_stories: vec![1, 2],
            do_shuffle,
            seed: Some(9),
            ..ExperimentParams::default()
        }
        .resolve(&data)
        .unwrap()
    }

    #[test]
    fn test_grid_order() {
        let cells = grid(&params(true));
        assert_eq!(cells.len(), 2 * 2 * 2 * 2);
        assert!(cells.iter().enumerate().all(|(i, c)| c.index == i));

        let first = &cells[0];
        assert_eq!(first.predictor, Predictor::Envelope);
        assert_eq!(first.subject, "UTS01");
        assert_eq!(first.n_train_stories, 1);
        assert_eq!(first.shuffle, ShuffleState::NotShuffled);
        // shuffle varies fastest, predictor slowest
        assert_eq!(cells[1].shuffle, ShuffleState::Shuffled);
        assert_eq!(cells[2].n_train_stories, 2);
        assert_eq!(cells[4].subject, "UTS02");
        assert_eq!(cells[8].predictor, Predictor::Embeddings);
    }

    #[test]
    fn test_output_dir() {
        let cell = GridCell {
            index: 0,
            predictor: Predictor::Embeddings,
            subject: "UTS03".into(),
            n_train_stories: 5,
            shuffle: ShuffleState::Shuffled,
        };
        assert_eq!(
            cell.output_dir(Path::new("/runs/r1")),
            PathBuf::from("/runs/r1/UTS03/embeddings/5/shuffled")
        );
    }

    #[test]
    fn test_cell_seed_ignores_shuffle() {
        let cells = grid(&params(true));
        assert_eq!(cells[0].seed(9), cells[1].seed(9));
        assert_ne!(cells[0].seed(9), cells[2].seed(9));
        assert_ne!(cells[0].seed(9), cells[4].seed(9));
        assert_ne!(cells[0].seed(9), cells[0].seed(10));
    }
}

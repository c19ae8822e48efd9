use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
use clap::{Args, ValueEnum};

use crate::error::{EncodingError, Result};
use crate::ridge::{BootstrapRidge, LooRidge, RidgeFitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum CrossValidation {
    /// Hold out each of the first n+1 stories in turn
    Loocv,
    /// Draw a random train/test split per repeat
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predictor {
    Envelope,
    Embeddings,
}

impl Predictor {
    pub const ALL: [Predictor; 2] = [Predictor::Envelope, Predictor::Embeddings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Predictor::Envelope => "envelope",
            Predictor::Embeddings => "embeddings",
        }
    }
}

impl std::fmt::Display for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predictor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "envelope" => Ok(Predictor::Envelope),
            "embeddings" => Ok(Predictor::Embeddings),
            other => Err(format!("unknown predictor '{}'", other)),
        }
    }
}

/// Predictor selection as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum PredictorChoice {
    All,
    Envelope,
    Embeddings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum Interpolation {
    Lanczos,
    Average,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Lanczos => "lanczos",
            Interpolation::Average => "average",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum RidgeImplementation {
    /// Leave-one-sample-out strength selection
    #[cfg_attr(feature = "cli", value(alias = "ridgeCV"))]
    RidgeCv,
    /// Chunked bootstrap strength selection
    #[cfg_attr(feature = "cli", value(alias = "ridge_huth"))]
    RidgeHuth,
}

impl RidgeImplementation {
    pub fn create_fitter(&self, seed: u64) -> Box<dyn RidgeFitter> {
        match self {
            RidgeImplementation::RidgeCv => Box::new(LooRidge::new()),
            RidgeImplementation::RidgeHuth => Box::new(BootstrapRidge::with_seed(seed)),
        }
    }
}

/// Whether training features were shuffled against the responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleState {
    NotShuffled,
    Shuffled,
}

impl ShuffleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShuffleState::NotShuffled => "not_shuffled",
            ShuffleState::Shuffled => "shuffled",
        }
    }

    pub fn is_shuffled(&self) -> bool {
        matches!(self, ShuffleState::Shuffled)
    }
}

impl From<bool> for ShuffleState {
    fn from(shuffled: bool) -> Self {
        if shuffled {
            ShuffleState::Shuffled
        } else {
            ShuffleState::NotShuffled
        }
    }
}

impl std::fmt::Display for ShuffleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShuffleState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_shuffled" => Ok(ShuffleState::NotShuffled),
            "shuffled" => Ok(ShuffleState::Shuffled),
            other => Err(format!("unknown shuffle state '{}'", other)),
        }
    }
}

/// Locations and story/subject lists shared by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root of the stimulus feature and response files
    pub data_dir: PathBuf,
    /// Directory that holds one folder per run
    pub runs_dir: PathBuf,
    /// Ordered story pool; leave-one-out uses this order
    #[serde(default)]
    pub stories: Vec<String>,
    /// Subjects that "all" expands to
    #[serde(default = "default_roster")]
    pub roster: Vec<String>,
}

fn default_roster() -> Vec<String> {
    (1..=8).map(|i| format!("UTS{:02}", i)).collect()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            runs_dir: PathBuf::from("data").join("runs"),
            stories: Vec::new(),
            roster: default_roster(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Args))]
pub struct ExperimentParams {
    /// Cross-validation policy (loocv, simple)
    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = CrossValidation::Loocv))]
    pub cross_validation: CrossValidation,

    /// Predictors to fit; "all" runs every predictor
    #[cfg_attr(feature = "cli", arg(long, value_enum, num_args = 1.., default_values_t = vec![PredictorChoice::All]))]
    pub predictor: Vec<PredictorChoice>,

    /// Training-set sizes, each fitted separately
    #[cfg_attr(feature = "cli", arg(long, num_args = 1.., default_values_t = vec![1, 3, 5]))]
    pub n_train_stories: Vec<usize>,

    /// Pin the test story (simple policy only)
    #[cfg_attr(feature = "cli", arg(long))]
    pub test_story: Option<String>,

    /// Random train/test draws per cell (simple policy only)
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 5))]
    pub n_repeats: usize,

    /// Subject identifiers; "all" expands to the configured roster
    #[cfg_attr(feature = "cli", arg(long, num_args = 1.., default_values_t = vec!["UTS02".to_string()]))]
    pub subject: Vec<String>,

    /// Feature delays used to model the haemodynamic lag
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 5))]
    pub n_delays: usize,

    /// Word-embedding interpolation (embeddings predictor only)
    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = Interpolation::Lanczos))]
    pub interpolation: Interpolation,

    /// Strength-selection strategy
    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = RidgeImplementation::RidgeHuth))]
    pub ridge_implementation: RidgeImplementation,

    /// Also fit a shuffled-feature control for every cell
    #[cfg_attr(feature = "cli", arg(long))]
    pub do_shuffle: bool,

    /// Do not memoize loaded features across subjects
    #[cfg_attr(feature = "cli", arg(long))]
    pub no_cache: bool,

    /// Reload stories for every partition instead of keeping them in memory
    #[cfg_attr(feature = "cli", arg(long))]
    pub no_keep_train_stories_in_mem: bool,

    /// Folder name inside the runs directory (generated when omitted)
    #[cfg_attr(feature = "cli", arg(long))]
    pub run_folder_name: Option<String>,

    /// Seed for partition sampling, shuffling and bootstraps
    #[cfg_attr(feature = "cli", arg(long))]
    pub seed: Option<u64>,

    /// Test stories per random split (simple policy, unpinned)
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 1))]
    pub n_test_stories: usize,

    /// Skip this many grid cells and continue an existing run
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 0))]
    pub resume_from: usize,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            cross_validation: CrossValidation::Loocv,
            predictor: vec![PredictorChoice::All],
            n_train_stories: vec![1, 3, 5],
            test_story: None,
            n_repeats: 5,
            subject: vec!["UTS02".to_string()],
            n_delays: 5,
            interpolation: Interpolation::Lanczos,
            ridge_implementation: RidgeImplementation::RidgeHuth,
            do_shuffle: false,
            no_cache: false,
            no_keep_train_stories_in_mem: false,
            run_folder_name: None,
            seed: None,
            n_test_stories: 1,
            resume_from: 0,
        }
    }
}

/// Fully expanded parameters of one run, persisted as `params.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParams {
    pub cross_validation: CrossValidation,
    pub predictor_arg: Vec<PredictorChoice>,
    pub predictors: Vec<Predictor>,
    pub n_train_stories: Vec<usize>,
    pub test_story: Option<String>,
    pub n_repeats: usize,
    pub subject_arg: Vec<String>,
    pub subjects: Vec<String>,
    pub n_delays: usize,
    pub interpolation: Interpolation,
    pub ridge_implementation: RidgeImplementation,
    pub shuffle_opts: Vec<ShuffleState>,
    pub use_cache: bool,
    pub keep_train_stories_in_mem: bool,
    pub n_test_stories: usize,
    /// Seed as given; `None` when it was drawn for this run
    pub seed_arg: Option<u64>,
    pub seed: u64,
    pub stories: Vec<String>,
    pub resume_from: usize,
}

impl ExperimentParams {
    /// Expand "all", check subjects and the pinned test story against
    /// `data`, and fix the seed.
    pub fn resolve(&self, data: &DataConfig) -> Result<ResolvedParams> {
        let predictors = if self.predictor.contains(&PredictorChoice::All) {
            Predictor::ALL.to_vec()
        } else {
            let mut out = Vec::new();
            for choice in &self.predictor {
                let p = match choice {
                    PredictorChoice::Envelope => Predictor::Envelope,
                    PredictorChoice::Embeddings => Predictor::Embeddings,
                    PredictorChoice::All => continue,
                };
                if !out.contains(&p) {
                    out.push(p);
                }
            }
            out
        };

        let subjects = if self.subject.iter().any(|s| s == "all") {
            data.roster.clone()
        } else {
            for s in &self.subject {
                if !data.roster.contains(s) {
                    return Err(EncodingError::UnknownSubject(s.clone()));
                }
            }
            self.subject.clone()
        };

        if let Some(test) = &self.test_story {
            if !data.stories.contains(test) {
                return Err(EncodingError::UnknownTestStory(test.clone()));
            }
        }

        let shuffle_opts = if self.do_shuffle {
            vec![ShuffleState::NotShuffled, ShuffleState::Shuffled]
        } else {
            vec![ShuffleState::NotShuffled]
        };

        Ok(ResolvedParams {
            cross_validation: self.cross_validation,
            predictor_arg: self.predictor.clone(),
            predictors,
            n_train_stories: self.n_train_stories.clone(),
            test_story: self.test_story.clone(),
            n_repeats: self.n_repeats,
            subject_arg: self.subject.clone(),
            subjects,
            n_delays: self.n_delays,
            interpolation: self.interpolation,
            ridge_implementation: self.ridge_implementation,
            shuffle_opts,
            use_cache: !self.no_cache,
            keep_train_stories_in_mem: !self.no_keep_train_stories_in_mem,
            n_test_stories: self.n_test_stories.max(1),
            seed_arg: self.seed,
            seed: self.seed.unwrap_or_else(rand::random),
            stories: data.stories.clone(),
            resume_from: self.resume_from,
        })
    }
}

impl ResolvedParams {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| EncodingError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Parameters for continuing the run recorded as `stored`.
    ///
    /// The seed is inherited unless one was given explicitly, in which case
    /// it must match. Everything else that shapes the grid or its results
    /// must match as well; only the resume position and the memory toggles
    /// may differ.
    pub fn continue_run(&self, stored: &ResolvedParams) -> Result<ResolvedParams> {
        if let Some(seed) = self.seed_arg {
            if seed != stored.seed {
                return Err(EncodingError::ResumeMismatch(format!(
                    "seed {} differs from the recorded seed {}",
                    seed, stored.seed
                )));
            }
        }
        let resumed = ResolvedParams {
            seed_arg: stored.seed_arg,
            seed: stored.seed,
            ..self.clone()
        };
        let comparable = ResolvedParams {
            use_cache: stored.use_cache,
            keep_train_stories_in_mem: stored.keep_train_stories_in_mem,
            resume_from: stored.resume_from,
            ..resumed.clone()
        };
        if comparable != *stored {
            return Err(EncodingError::ResumeMismatch(
                "parameters differ from the recorded run".to_string(),
            ));
        }
        Ok(resumed)
    }
}

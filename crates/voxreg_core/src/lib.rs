//! Cross-validated ridge encoding models.
//!
//! Maps per-story stimulus features to per-voxel responses:
//! - [`standardize`]: column z-scoring with a stabilized denominator
//! - [`scoring`]: per-column Pearson correlation behind the [`Scorer`] trait
//! - [`ridge`] and [`regression`]: ridge fits with a strength chosen per voxel
//! - [`crossval`]: leave-one-out and repeated-sampling partitions, shuffle control
//! - [`sweep`]: the experiment grid with a crash-safe running summary

pub mod config;
pub mod crossval;
pub mod error;
pub mod features;
pub mod loader;
pub mod persist;
pub mod regression;
pub mod ridge;
pub mod scoring;
pub mod standardize;
pub mod summary;
pub mod sweep;
pub mod synthetic;

pub use config::{
    CrossValidation, DataConfig, ExperimentParams, Interpolation, Predictor, PredictorChoice, ResolvedParams,
    RidgeImplementation, ShuffleState,
};
pub use crossval::{CrossValidator, CvPlan, CvSummary, FoldSink, Partition};
pub use error::{EncodingError, Result};
pub use loader::{InMemoryLoader, NpyStoryLoader, StoryLoader, StoryStore};
pub use regression::{ridge_regression, RegressionOutcome, Regressor, SplitData, StoryMatrices};
pub use ridge::{BootstrapRidge, LooRidge, RidgeFit, RidgeFitter};
pub use scoring::{PearsonScorer, Scorer};
pub use summary::{ResultsSummary, SummaryKey};
pub use sweep::{grid, GridCell, Sweep};
pub use synthetic::{SyntheticConfig, SyntheticDataset};

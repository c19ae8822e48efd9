//! Seeded synthetic stories with planted linear responses.
//!
//! Responses follow the features one sample late, so a model with at least
//! one delay can recover them. Used for smoke runs and tests.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{s, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Interpolation, Predictor};
use crate::error::Result;
use crate::persist::{ensure_dir, write_npy};
use crate::regression::StoryMatrices;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub n_stories: usize,
    pub min_rows: usize,
    pub max_rows: usize,
    pub envelope_dim: usize,
    pub embedding_dim: usize,
    pub n_voxels: usize,
    pub subjects: Vec<String>,
    /// Amplitude of the uniform noise added to responses
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_stories: 6,
            min_rows: 60,
            max_rows: 90,
            envelope_dim: 1,
            embedding_dim: 8,
            n_voxels: 16,
            subjects: vec!["UTS01".to_string(), "UTS02".to_string()],
            noise: 0.5,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub stories: Vec<String>,
    pub envelope: StoryMatrices,
    pub embeddings: StoryMatrices,
    /// subject -> story -> responses
    pub responses: BTreeMap<String, StoryMatrices>,
}

fn uniform(rng: &mut ChaCha8Rng, shape: (usize, usize), scale: f64) -> Array2<f64> {
    Array2::from_shape_simple_fn(shape, || rng.gen_range(-scale..=scale))
}

/// Responses driven by the previous sample of `x`.
fn lagged(x: &Array2<f64>, weights: &Array2<f64>) -> Array2<f64> {
    let mut y = Array2::zeros((x.nrows(), weights.ncols()));
    if x.nrows() > 1 {
        let drive = x.slice(s![..-1, ..]).dot(weights);
        y.slice_mut(s![1.., ..]).assign(&drive);
    }
    y
}

impl SyntheticDataset {
    pub fn generate(config: &SyntheticConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let max_rows = config.max_rows.max(config.min_rows);

        let stories: Vec<String> = (0..config.n_stories).map(|i| format!("story_{:02}", i)).collect();
        let mut envelope = StoryMatrices::new();
        let mut embeddings = StoryMatrices::new();
        for story in &stories {
            let rows = rng.gen_range(config.min_rows..=max_rows);
            envelope.insert(story.clone(), uniform(&mut rng, (rows, config.envelope_dim), 1.0));
            embeddings.insert(story.clone(), uniform(&mut rng, (rows, config.embedding_dim), 1.0));
        }

        let mut responses = BTreeMap::new();
        for subject in &config.subjects {
            let w_env = uniform(&mut rng, (config.envelope_dim, config.n_voxels), 1.0);
            let w_emb = uniform(&mut rng, (config.embedding_dim, config.n_voxels), 1.0);
            let mut per_story = StoryMatrices::new();
            for story in &stories {
                let (env, emb) = (&envelope[story], &embeddings[story]);
                let noise = uniform(&mut rng, (env.nrows(), config.n_voxels), config.noise);
                per_story.insert(story.clone(), lagged(env, &w_env) + lagged(emb, &w_emb) + noise);
            }
            responses.insert(subject.clone(), per_story);
        }

        Self {
            stories,
            envelope,
            embeddings,
            responses,
        }
    }

    pub fn features(&self, predictor: Predictor) -> &StoryMatrices {
        match predictor {
            Predictor::Envelope => &self.envelope,
            Predictor::Embeddings => &self.embeddings,
        }
    }

    /// Write the dataset in the layout read by
    /// [`NpyStoryLoader`](crate::loader::NpyStoryLoader). Embeddings are
    /// written once per interpolation method.
    pub fn write(&self, data_dir: &Path) -> Result<()> {
        let features = data_dir.join("features");
        let envelope_dir = features.join(Predictor::Envelope.as_str());
        ensure_dir(&envelope_dir)?;
        for (story, x) in &self.envelope {
            write_npy(&envelope_dir.join(format!("{}.npy", story)), x)?;
        }

        for interpolation in [Interpolation::Lanczos, Interpolation::Average] {
            let dir = features
                .join(Predictor::Embeddings.as_str())
                .join(interpolation.as_str());
            ensure_dir(&dir)?;
            for (story, x) in &self.embeddings {
                write_npy(&dir.join(format!("{}.npy", story)), x)?;
            }
        }

        for (subject, per_story) in &self.responses {
            let dir = data_dir.join("responses").join(subject);
            ensure_dir(&dir)?;
            for (story, y) in per_story {
                write_npy(&dir.join(format!("{}.npy", story)), y)?;
            }
        }
        Ok(())
    }
}

//! Boundary with the data layer that produces per-story matrices.
//!
//! The regression core only needs a feature matrix and a response matrix
//! per story. [`StoryLoader`] is that seam; [`StoryStore`] sits on top of a
//! loader for one grid cell and decides whether stories stay in memory
//! across partitions.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::debug;

use crate::config::{Interpolation, Predictor};
use crate::error::{EncodingError, MatrixKind, Result};
use crate::features::make_delayed;
use crate::regression::StoryMatrices;

/// Source of per-story matrices.
pub trait StoryLoader {
    fn load_features(&self, predictor: Predictor, story: &str) -> Result<Array2<f64>>;

    fn load_responses(&self, subject: &str, story: &str) -> Result<Array2<f64>>;
}

/// Loader over matrices that are already in memory.
///
/// Features are shared by every predictor and responses by every subject,
/// which is what tests and small experiments need.
#[derive(Clone, Debug)]
pub struct InMemoryLoader {
    features: StoryMatrices,
    responses: StoryMatrices,
}

impl InMemoryLoader {
    /// Fails with [`EncodingError::KeyMismatch`] unless both maps cover the
    /// same stories.
    pub fn new(features: StoryMatrices, responses: StoryMatrices) -> Result<Self> {
        check_same_stories(&features, &responses)?;
        Ok(Self {
            features,
            responses,
        })
    }
}

impl StoryLoader for InMemoryLoader {
    fn load_features(&self, _predictor: Predictor, story: &str) -> Result<Array2<f64>> {
        self.features
            .get(story)
            .cloned()
            .ok_or_else(|| EncodingError::MissingStory {
                story: story.to_string(),
                kind: MatrixKind::Features,
            })
    }

    fn load_responses(&self, _subject: &str, story: &str) -> Result<Array2<f64>> {
        self.responses
            .get(story)
            .cloned()
            .ok_or_else(|| EncodingError::MissingStory {
                story: story.to_string(),
                kind: MatrixKind::Responses,
            })
    }
}

/// Fail fast when two story maps are keyed differently.
pub fn check_same_stories(features: &StoryMatrices, responses: &StoryMatrices) -> Result<()> {
    let f: BTreeSet<&String> = features.keys().collect();
    let r: BTreeSet<&String> = responses.keys().collect();
    if f == r {
        return Ok(());
    }
    Err(EncodingError::KeyMismatch {
        only_features: f.difference(&r).map(|s| s.to_string()).collect(),
        only_responses: r.difference(&f).map(|s| s.to_string()).collect(),
    })
}

/// Loader reading `.npy` matrices from a data directory:
///
/// ```text
/// {data_dir}/features/envelope/{story}.npy
/// {data_dir}/features/embeddings/{interpolation}/{story}.npy
/// {data_dir}/responses/{subject}/{story}.npy
/// ```
///
/// Features are delay-embedded on load. With `use_cache` the embedded
/// features are memoized for the loader's lifetime, which spares re-reading
/// them for every subject.
pub struct NpyStoryLoader {
    data_dir: PathBuf,
    n_delays: usize,
    interpolation: Interpolation,
    use_cache: bool,
    cache: RefCell<HashMap<(Predictor, String), Array2<f64>>>,
}

impl NpyStoryLoader {
    pub fn new(data_dir: impl Into<PathBuf>, n_delays: usize, interpolation: Interpolation, use_cache: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            n_delays,
            interpolation,
            use_cache,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn feature_path(&self, predictor: Predictor, story: &str) -> PathBuf {
        let dir = self.data_dir.join("features").join(predictor.as_str());
        let dir = match predictor {
            Predictor::Envelope => dir,
            Predictor::Embeddings => dir.join(self.interpolation.as_str()),
        };
        dir.join(format!("{}.npy", story))
    }

    pub fn response_path(&self, subject: &str, story: &str) -> PathBuf {
        self.data_dir
            .join("responses")
            .join(subject)
            .join(format!("{}.npy", story))
    }

    fn read(path: &Path, story: &str, kind: MatrixKind) -> Result<Array2<f64>> {
        if !path.exists() {
            return Err(EncodingError::MissingStory {
                story: story.to_string(),
                kind,
            });
        }
        ndarray_npy::read_npy(path).map_err(|source| EncodingError::NpyRead {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl StoryLoader for NpyStoryLoader {
    fn load_features(&self, predictor: Predictor, story: &str) -> Result<Array2<f64>> {
        let key = (predictor, story.to_string());
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(hit.clone());
        }

        let path = self.feature_path(predictor, story);
        let raw = Self::read(&path, story, MatrixKind::Features)?;
        let delayed = make_delayed(raw.view(), self.n_delays);
        debug!(
            story = story,
            predictor = predictor.as_str(),
            shape = ?delayed.dim(),
            "features loaded"
        );

        if self.use_cache {
            self.cache.borrow_mut().insert(key, delayed.clone());
        }
        Ok(delayed)
    }

    fn load_responses(&self, subject: &str, story: &str) -> Result<Array2<f64>> {
        let path = self.response_path(subject, story);
        Self::read(&path, story, MatrixKind::Responses)
    }
}

/// Per-cell view on a loader for one (predictor, subject) pair.
pub struct StoryStore<'a> {
    loader: &'a dyn StoryLoader,
    predictor: Predictor,
    subject: String,
    keep_in_memory: bool,
    features: StoryMatrices,
    responses: StoryMatrices,
}

impl<'a> StoryStore<'a> {
    pub fn new(loader: &'a dyn StoryLoader, predictor: Predictor, subject: &str, keep_in_memory: bool) -> Self {
        Self {
            loader,
            predictor,
            subject: subject.to_string(),
            keep_in_memory,
            features: StoryMatrices::new(),
            responses: StoryMatrices::new(),
        }
    }

    pub fn keeps_in_memory(&self) -> bool {
        self.keep_in_memory
    }

    /// Number of stories currently retained.
    pub fn retained(&self) -> usize {
        self.features.len()
    }

    fn load_into(&self, stories: &[String], features: &mut StoryMatrices, responses: &mut StoryMatrices) -> Result<()> {
        for story in stories {
            if !features.contains_key(story) {
                let x = self.loader.load_features(self.predictor, story)?;
                features.insert(story.clone(), x);
            }
            if !responses.contains_key(story) {
                let y = self.loader.load_responses(&self.subject, story)?;
                responses.insert(story.clone(), y);
            }
        }
        Ok(())
    }

    /// Make `stories` available to `f`, loading whatever is missing.
    ///
    /// Retained stories are reused; otherwise the matrices are dropped as
    /// soon as `f` returns.
    pub fn with_stories<T>(
        &mut self,
        stories: &[String],
        f: impl FnOnce(&StoryMatrices, &StoryMatrices) -> Result<T>,
    ) -> Result<T> {
        if self.keep_in_memory {
            let mut features = std::mem::take(&mut self.features);
            let mut responses = std::mem::take(&mut self.responses);
            let loaded = self.load_into(stories, &mut features, &mut responses);
            self.features = features;
            self.responses = responses;
            loaded?;
            f(&self.features, &self.responses)
        } else {
            let mut features = StoryMatrices::new();
            let mut responses = StoryMatrices::new();
            self.load_into(stories, &mut features, &mut responses)?;
            f(&features, &responses)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maps(names: &[&str]) -> StoryMatrices {
        names
            .iter()
            .map(|n| (n.to_string(), Array2::<f64>::zeros((4, 2))))
            .collect()
    }

    #[test]
    fn test_key_mismatch() {
        let err = InMemoryLoader::new(maps(&["a", "b"]), maps(&["b", "c"])).unwrap_err();
        match err {
            EncodingError::KeyMismatch {
                only_features,
                only_responses,
            } => {
                assert_eq!(only_features, vec!["a".to_string()]);
                assert_eq!(only_responses, vec!["c".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_store_retention() {
        let loader = InMemoryLoader::new(maps(&["a", "b", "c"]), maps(&["a", "b", "c"])).unwrap();
        let stories: Vec<String> = vec!["a".into(), "b".into()];

        let mut keep = StoryStore::new(&loader, Predictor::Envelope, "UTS01", true);
        let n = keep.with_stories(&stories, |f, r| Ok(f.len() + r.len())).unwrap();
        assert_eq!(n, 4);
        assert_eq!(keep.retained(), 2);

        let mut transient = StoryStore::new(&loader, Predictor::Envelope, "UTS01", false);
        transient.with_stories(&stories, |f, _| Ok(f.len())).unwrap();
        assert_eq!(transient.retained(), 0);
    }

    #[test]
    fn test_store_missing_story() {
        let loader = InMemoryLoader::new(maps(&["a"]), maps(&["a"])).unwrap();
        let mut store = StoryStore::new(&loader, Predictor::Envelope, "UTS01", true);
        let err = store
            .with_stories(&["zzz".to_string()], |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, EncodingError::MissingStory { .. }));
    }

    #[test]
    fn test_npy_paths() {
        let loader = NpyStoryLoader::new("/data", 0, Interpolation::Average, true);
        assert_eq!(
            loader.feature_path(Predictor::Embeddings, "wheretheressmoke"),
            PathBuf::from("/data/features/embeddings/average/wheretheressmoke.npy")
        );
        assert_eq!(
            loader.feature_path(Predictor::Envelope, "x"),
            PathBuf::from("/data/features/envelope/x.npy")
        );
        assert_eq!(
            loader.response_path("UTS02", "x"),
            PathBuf::from("/data/responses/UTS02/x.npy")
        );
    }
}

//! Best mean score per grid cell.
//!
//! The sweep stores each cell's maximum over voxels with
//! [`ResultsSummary::insert`], so a rerun cell overwrites its old entry.
//! Entries are keyed by an explicit [`SummaryKey`]; nothing is created on
//! lookup. On disk the summary is a nested JSON object
//! `predictor -> subject -> n_train_stories -> shuffle state -> score`,
//! rewritten atomically after every cell.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Predictor, ShuffleState};
use crate::error::{EncodingError, Result};
use crate::persist::write_json;

/// Coordinates of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub predictor: Predictor,
    pub subject: String,
    pub n_train_stories: usize,
    pub shuffle: ShuffleState,
}

/// Serialized form: NaN scores become `null`.
type Nested = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, Option<f64>>>>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsSummary {
    entries: BTreeMap<SummaryKey, f64>,
}

impl ResultsSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cell's score.
    ///
    /// A new key takes `value` as is. An existing key keeps the larger of
    /// the two, and a NaN never replaces a number. Returns the stored value.
    pub fn record(&mut self, key: SummaryKey, value: f64) -> f64 {
        let slot = self.entries.entry(key).or_insert(value);
        if value > *slot || slot.is_nan() {
            *slot = value;
        }
        *slot
    }

    /// Store a cell's score, replacing whatever was recorded for it.
    /// Returns the previous value.
    pub fn insert(&mut self, key: SummaryKey, value: f64) -> Option<f64> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &SummaryKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SummaryKey, f64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    fn to_nested(&self) -> Nested {
        let mut nested = Nested::new();
        for (key, &value) in &self.entries {
            nested
                .entry(key.predictor.to_string())
                .or_default()
                .entry(key.subject.clone())
                .or_default()
                .entry(key.n_train_stories.to_string())
                .or_default()
                .insert(key.shuffle.to_string(), (!value.is_nan()).then_some(value));
        }
        nested
    }

    fn from_nested(nested: Nested) -> Result<Self> {
        let bad = |what: String| EncodingError::ShapeMismatch(format!("malformed summary: {}", what));
        let mut entries = BTreeMap::new();
        for (predictor, subjects) in nested {
            let predictor: Predictor = predictor.parse().map_err(bad)?;
            for (subject, sizes) in subjects {
                for (size, states) in sizes {
                    let n_train_stories: usize = size
                        .parse()
                        .map_err(|_| bad(format!("train size '{}'", size)))?;
                    for (state, value) in states {
                        let shuffle: ShuffleState = state.parse().map_err(bad)?;
                        entries.insert(
                            SummaryKey {
                                predictor,
                                subject: subject.clone(),
                                n_train_stories,
                                shuffle,
                            },
                            value.unwrap_or(f64::NAN),
                        );
                    }
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_nested())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_nested(serde_json::from_str(json)?)
    }

    /// Atomically replace the file at `path`.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_json(path, &self.to_nested())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| EncodingError::io(path, e))?;
        Self::from_json(&json)
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Which side of a stimulus pair a lookup was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    Features,
    Responses,
}

impl std::fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixKind::Features => f.write_str("features"),
            MatrixKind::Responses => f.write_str("responses"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("story '{story}' has no {kind} matrix")]
    MissingStory { story: String, kind: MatrixKind },

    #[error("feature and response maps disagree on stories: only in features {only_features:?}, only in responses {only_responses:?}")]
    KeyMismatch {
        only_features: Vec<String>,
        only_responses: Vec<String>,
    },

    #[error("story '{story}' has {feature_rows} feature rows but {response_rows} response rows")]
    RowMismatch {
        story: String,
        feature_rows: usize,
        response_rows: usize,
    },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("partition has an empty {0} set")]
    EmptyPartition(&'static str),

    #[error("cross-validation produced no partitions")]
    NoPartitions,

    #[error("story '{0}' appears in both train and test sets")]
    OverlappingPartition(String),

    #[error("requested {requested} training stories but only {available} are available")]
    TrainSizeTooLarge { requested: usize, available: usize },

    #[error("test story '{0}' is not in the story pool")]
    UnknownTestStory(String),

    #[error("candidate regularization set is empty")]
    EmptyAlphas,

    #[error("regularization strength {0} is negative or not finite")]
    InvalidAlpha(f64),

    #[error("subject '{0}' is not in the configured roster")]
    UnknownSubject(String),

    #[error("cannot resume run: {0}")]
    ResumeMismatch(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    NpyRead {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    #[error("failed to write {path}: {source}")]
    NpyWrite {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },
}

impl EncodingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EncodingError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EncodingError>;

//! Synchronous, crash-safe writes of run artifacts.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use ndarray::{ArrayBase, Data, Dimension};
use ndarray_npy::WritableElement;
use serde::Serialize;

use crate::error::{EncodingError, Result};

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader sees either the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&tmp).map_err(|e| EncodingError::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| EncodingError::io(&tmp, e))?;
    file.sync_all().map_err(|e| EncodingError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| EncodingError::io(path, e))
}

/// Pretty-printed JSON, written atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

pub fn write_npy<S, D>(path: &Path, array: &ArrayBase<S, D>) -> Result<()>
where
    S: Data,
    S::Elem: WritableElement,
    D: Dimension,
{
    ndarray_npy::write_npy(path, array).map_err(|source| EncodingError::NpyWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| EncodingError::io(path, e))
}

//! Error definitions and manifest records for feature_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
    #[error("{0}")]
    Other(String),
}

/// One labelled action instance, in frames of the source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub start: f32,
    pub end: f32,
    pub label: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub video: String,
    /// Raw little-endian `f32` file of `num_steps x feature_dim` values, relative to the manifest.
    pub features: PathBuf,
    pub num_steps: usize,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

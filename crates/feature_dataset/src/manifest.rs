//! Per-dataset video manifest and raw feature files.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{DatasetError, DatasetResult, VideoEntry};

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoManifest {
    pub videos: Vec<VideoEntry>,
}

impl VideoManifest {
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| DatasetError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data =
            serde_json::to_vec_pretty(self).map_err(|e| DatasetError::Other(e.to_string()))?;
        fs::write(path, data).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject empty/reversed annotations and labels outside `1..num_classes`.
    pub fn validate(&self, path: &Path, num_classes: usize) -> DatasetResult<()> {
        let invalid = |msg: String| {
            Err(DatasetError::Validation {
                path: path.to_path_buf(),
                msg,
            })
        };
        for entry in &self.videos {
            if entry.num_steps == 0 {
                return invalid(format!("video {} has no feature steps", entry.video));
            }
            for ann in &entry.annotations {
                if ann.label == 0 || ann.label >= num_classes {
                    return invalid(format!(
                        "video {}: label {} outside 1..{num_classes}",
                        entry.video, ann.label
                    ));
                }
                if !ann.start.is_finite() || !ann.end.is_finite() || ann.end <= ann.start {
                    return invalid(format!(
                        "video {}: bad annotation [{}, {}]",
                        entry.video, ann.start, ann.end
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Read a video's `[num_steps, feature_dim]` feature matrix.
pub fn read_features(root: &Path, entry: &VideoEntry, feature_dim: usize) -> DatasetResult<Vec<f32>> {
    let path = resolve(root, &entry.features);
    let data = fs::read(&path).map_err(|e| DatasetError::Io {
        path: path.clone(),
        source: e,
    })?;
    let expected = entry
        .num_steps
        .checked_mul(feature_dim)
        .and_then(|v| v.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| DatasetError::Other("overflow computing feature bytes".into()))?;
    if data.len() != expected {
        return Err(DatasetError::Validation {
            path,
            msg: format!(
                "expected {expected} bytes ({} steps x {feature_dim} dims), found {}",
                entry.num_steps,
                data.len()
            ),
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Write a row-major feature matrix in the on-disk layout read by [`read_features`].
pub fn write_features(path: &Path, values: &[f32]) -> DatasetResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DatasetError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, bytes).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn resolve(root: &Path, rel: &Path) -> PathBuf {
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        root.join(rel)
    }
}

//! Sliding-window loader over pre-extracted per-step video features.
//!
//! A dataset/modality directory holds a `manifest.json` listing videos, their raw `f32`
//! feature files and frame-level annotations. Windows are cut, zero-padded and batched
//! into the `data_contracts` batch types.

pub mod manifest;
pub mod source;
pub mod types;
pub mod windowing;

pub use manifest::{read_features, write_features, VideoManifest, MANIFEST_NAME};
pub use source::{get_test_data, get_train_data, ManifestSource};
pub use types::{Annotation, DatasetError, DatasetResult, VideoEntry};
pub use windowing::{extract_window, test_window_starts, train_window_starts, window_ground_truth};

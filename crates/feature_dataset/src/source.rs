use data_contracts::{
    DetectorConfig, GroundTruthBatch, GroundTruthSegment, TestBatch, TrainBatch, WindowMeta,
    WindowSource,
};
use rand::prelude::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

use crate::manifest::{read_features, VideoManifest, MANIFEST_NAME};
use crate::types::{DatasetError, DatasetResult};
use crate::windowing::{
    extract_window, test_window_starts, train_window_starts, window_ground_truth,
};

/// Windows cut from the videos of one `<root>/<dataset>/<modality>` manifest.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    dir: PathBuf,
    manifest: VideoManifest,
    feature_dim: usize,
}

struct TrainWindow {
    features: Vec<f32>,
    meta: WindowMeta,
    ground_truth: Vec<GroundTruthSegment>,
}

impl ManifestSource {
    /// Open `<data.root>/<dataset>/<modality>/manifest.json`.
    pub fn open(config: &DetectorConfig, dataset: &str, modality: &str) -> DatasetResult<Self> {
        let dir = config.data.root.join(dataset).join(modality);
        let feature_dim = config.model.resolve_feature_dim(dataset, modality);
        Self::open_dir(&dir, feature_dim, config.model.num_classes)
    }

    pub fn open_dir(dir: &Path, feature_dim: usize, num_classes: usize) -> DatasetResult<Self> {
        let path = dir.join(MANIFEST_NAME);
        let manifest = VideoManifest::load(&path)?;
        manifest.validate(&path, num_classes)?;
        tracing::debug!(
            manifest = %path.display(),
            videos = manifest.videos.len(),
            "loaded video manifest"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            feature_dim,
        })
    }

    pub fn manifest(&self) -> &VideoManifest {
        &self.manifest
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn train_windows(&self, config: &DetectorConfig) -> DatasetResult<Vec<TrainWindow>> {
        let model = &config.model;
        let fps = model.frames_per_step();
        let stride = config.data.train_stride(model.input_steps);
        let mut windows = Vec::new();
        let mut dropped = 0usize;
        for entry in &self.manifest.videos {
            let features = read_features(&self.dir, entry, self.feature_dim)?;
            for start in train_window_starts(entry.num_steps, model.input_steps, stride) {
                let start_frame = start as f32 * fps;
                let ground_truth = window_ground_truth(
                    &entry.annotations,
                    start_frame,
                    model.window_size,
                    config.data.min_gt_coverage,
                );
                if ground_truth.is_empty() && !config.data.keep_empty_windows {
                    dropped += 1;
                    continue;
                }
                windows.push(TrainWindow {
                    features: extract_window(
                        &features,
                        entry.num_steps,
                        self.feature_dim,
                        start,
                        model.input_steps,
                    ),
                    meta: WindowMeta {
                        video: entry.video.clone(),
                        start: start_frame,
                        length: model.window_size,
                    },
                    ground_truth,
                });
            }
        }
        tracing::info!(windows = windows.len(), dropped, "cut training windows");
        Ok(windows)
    }
}

impl WindowSource for ManifestSource {
    type Error = DatasetError;

    fn train_batches(&self, config: &DetectorConfig, shuffle: bool) -> DatasetResult<Vec<TrainBatch>> {
        let mut windows = self.train_windows(config)?;
        if shuffle {
            let mut rng = rand::rngs::StdRng::seed_from_u64(config.train.seed);
            windows.shuffle(&mut rng);
        }
        let batch_size = config.train.batch_size.max(1);
        let steps = config.model.input_steps;
        Ok(windows
            .chunks(batch_size)
            .map(|chunk| {
                let mut features = Vec::with_capacity(chunk.len() * steps * self.feature_dim);
                let mut metas = Vec::with_capacity(chunk.len());
                let mut items = Vec::with_capacity(chunk.len());
                for w in chunk {
                    features.extend_from_slice(&w.features);
                    metas.push(w.meta.clone());
                    items.push(w.ground_truth.clone());
                }
                TrainBatch {
                    features,
                    steps,
                    feature_dim: self.feature_dim,
                    windows: metas,
                    ground_truth: GroundTruthBatch::from_items(&items),
                }
            })
            .collect())
    }

    fn test_batches(&self, config: &DetectorConfig) -> DatasetResult<Vec<TestBatch>> {
        let model = &config.model;
        let fps = model.frames_per_step();
        let stride = config.data.test_stride(model.input_steps);
        let batch_size = config.train.batch_size.max(1);
        let mut batches = Vec::new();
        let empty = || TestBatch {
            features: Vec::new(),
            steps: model.input_steps,
            feature_dim: self.feature_dim,
            windows: Vec::new(),
        };
        let mut current = empty();
        for entry in &self.manifest.videos {
            let features = read_features(&self.dir, entry, self.feature_dim)?;
            for start in test_window_starts(entry.num_steps, model.input_steps, stride) {
                current.features.extend(extract_window(
                    &features,
                    entry.num_steps,
                    self.feature_dim,
                    start,
                    model.input_steps,
                ));
                current.windows.push(WindowMeta {
                    video: entry.video.clone(),
                    start: start as f32 * fps,
                    length: model.window_size,
                });
                if current.len() == batch_size {
                    batches.push(std::mem::replace(&mut current, empty()));
                }
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        tracing::info!(batches = batches.len(), "cut test windows");
        Ok(batches)
    }
}

/// Training batches for one dataset/modality (`get_train_data`).
pub fn get_train_data(
    config: &DetectorConfig,
    modality: &str,
    dataset: &str,
    shuffle: bool,
) -> DatasetResult<Vec<TrainBatch>> {
    ManifestSource::open(config, dataset, modality)?.train_batches(config, shuffle)
}

/// Test batches with their window placements (`get_test_data`).
pub fn get_test_data(
    config: &DetectorConfig,
    modality: &str,
    dataset: &str,
) -> DatasetResult<Vec<TestBatch>> {
    ManifestSource::open(config, dataset, modality)?.test_batches(config)
}

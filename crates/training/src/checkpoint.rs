//! Epoch-numbered model checkpoints (`model-ep-<epoch>.bin`) in one directory.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::Backend;
use thiserror::Error;

const PREFIX: &str = "model-ep-";
const EXTENSION: &str = "bin";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to save checkpoint {path}: {source}")]
    Save { path: PathBuf, source: RecorderError },
    #[error("failed to restore checkpoint {path}: {source}")]
    Restore { path: PathBuf, source: RecorderError },
    #[error("no checkpoint for epoch {epoch} under {dir}")]
    Missing { epoch: usize, dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    /// Number of newest checkpoints kept by `prune`; 0 keeps all.
    keep_last: usize,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, keep_last: usize) -> Self {
        Self {
            dir: dir.into(),
            keep_last,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{PREFIX}{epoch}.{EXTENSION}"))
    }

    /// Saved epochs in ascending order. A missing directory has none.
    pub fn epochs(&self) -> Result<Vec<usize>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };
        let mut epochs: Vec<usize> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_epoch(&entry.file_name().to_string_lossy()))
            .collect();
        epochs.sort_unstable();
        Ok(epochs)
    }

    pub fn latest_epoch(&self) -> Result<Option<usize>, CheckpointError> {
        Ok(self.epochs()?.last().copied())
    }

    pub fn save<B: Backend, M: Module<B>>(&self, model: &M, epoch: usize) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|e| CheckpointError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path_for(epoch);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(path.clone(), &recorder)
            .map_err(|e| CheckpointError::Save {
                path: path.clone(),
                source: e,
            })?;
        tracing::debug!(path = %path.display(), epoch, "saved checkpoint");
        Ok(path)
    }

    /// Load the weights of `epoch` into `model`.
    pub fn restore<B: Backend, M: Module<B>>(
        &self,
        model: M,
        epoch: usize,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let path = self.path_for(epoch);
        if !path.exists() {
            return Err(CheckpointError::Missing {
                epoch,
                dir: self.dir.clone(),
            });
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .load_file(path.clone(), &recorder, device)
            .map_err(|e| CheckpointError::Restore { path, source: e })
    }

    /// Delete all but the newest `keep_last` checkpoints; returns the removed epochs.
    pub fn prune(&self) -> Result<Vec<usize>, CheckpointError> {
        if self.keep_last == 0 {
            return Ok(Vec::new());
        }
        let epochs = self.epochs()?;
        let excess = epochs.len().saturating_sub(self.keep_last);
        let removed: Vec<usize> = epochs.into_iter().take(excess).collect();
        for &epoch in &removed {
            let path = self.path_for(epoch);
            fs::remove_file(&path).map_err(|e| CheckpointError::Io { path, source: e })?;
        }
        Ok(removed)
    }

    /// Delete every checkpoint in the directory; returns the removed epochs.
    pub fn clear(&self) -> Result<Vec<usize>, CheckpointError> {
        let epochs = self.epochs()?;
        for &epoch in &epochs {
            let path = self.path_for(epoch);
            fs::remove_file(&path).map_err(|e| CheckpointError::Io { path, source: e })?;
        }
        Ok(epochs)
    }
}

fn parse_epoch(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(PREFIX)?
        .strip_suffix(&format!(".{EXTENSION}"))?
        .parse()
        .ok()
}

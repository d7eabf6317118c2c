use crate::InferenceBackend;
use anyhow::Context;
use data_contracts::ModelConfig;
use models::TemporalDetector;
use std::path::Path;
use training::CheckpointStore;

type Device = <InferenceBackend as burn::tensor::backend::Backend>::Device;

/// Builds detectors for inference from saved checkpoints.
///
/// A missing or unreadable checkpoint is an error; there is no untrained fallback.
pub struct InferenceFactory<'a> {
    pub model: &'a ModelConfig,
    pub feature_dim: usize,
}

impl InferenceFactory<'_> {
    pub fn load(
        &self,
        models_dir: &Path,
        epoch: usize,
        device: &Device,
    ) -> anyhow::Result<TemporalDetector<InferenceBackend>> {
        let model = TemporalDetector::<InferenceBackend>::new(self.model, self.feature_dim, device)?;
        let store = CheckpointStore::new(models_dir, 0);
        let model = store
            .restore(model, epoch, device)
            .with_context(|| format!("failed to restore detector for epoch {epoch}"))?;
        tracing::info!(
            path = %store.path_for(epoch).display(),
            anchors = model.layout().total,
            "loaded detector checkpoint"
        );
        Ok(model)
    }
}

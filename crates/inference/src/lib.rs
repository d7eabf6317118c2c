#![recursion_limit = "256"]

pub mod decode;
pub mod factory;
pub mod postprocess;

use anyhow::Context;
use data_contracts::{DetectorConfig, WindowSource};
use std::path::Path;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use decode::{test_operation, DetectionOutput};
pub use factory::InferenceFactory;
pub use postprocess::{
    final_result_process, fuse_streams, read_anchor_rows, read_proposals, result_process,
    temporal_nms, write_anchor_rows, write_proposals, AnchorRow, PostprocessError,
};

/// Restore the detector at `epoch` and predict every test window of `source` (`test_main`).
///
/// Returns per-anchor rows in absolute frames, in loader order.
pub fn run_test<S: WindowSource>(
    config: &DetectorConfig,
    source: &S,
    models_dir: &Path,
    epoch: usize,
) -> anyhow::Result<Vec<AnchorRow>> {
    let feature_dim = config
        .model
        .feature_dim
        .context("model.feature_dim must be resolved before testing")?;
    let device = <InferenceBackend as burn::tensor::backend::Backend>::Device::default();
    let model = InferenceFactory {
        model: &config.model,
        feature_dim,
    }
    .load(models_dir, epoch, &device)?;

    let batches = source
        .test_batches(config)
        .context("failed to load test windows")?;
    let mut rows = Vec::new();
    for batch in &batches {
        let input = training::collate_test::<InferenceBackend>(batch, &device)?;
        let output = test_operation(&model, input, config.model.window_size)?;
        rows.extend(result_process(&output, &batch.windows, config.model.window_size)?);
    }
    tracing::info!(
        windows = batches.iter().map(|b| b.len()).sum::<usize>(),
        rows = rows.len(),
        "inference finished"
    );
    Ok(rows)
}

pub mod prelude {
    pub use crate::decode::DetectionOutput;
    pub use crate::factory::InferenceFactory;
    pub use crate::postprocess::AnchorRow;
    pub use crate::{run_test, InferenceBackend};
}

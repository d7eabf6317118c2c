use burn::tensor::TensorData;
use burn::tensor::{backend::Backend, Tensor};
use data_contracts::{TestBatch, TrainBatch};

/// Pack row-major window features into a `[batch, steps, feature_dim]` tensor.
pub fn collate_features<B: Backend>(
    features: &[f32],
    batch: usize,
    steps: usize,
    feature_dim: usize,
    device: &B::Device,
) -> anyhow::Result<Tensor<B, 3>> {
    if batch == 0 {
        anyhow::bail!("cannot collate empty batch");
    }
    let expected = batch * steps * feature_dim;
    if features.len() != expected {
        anyhow::bail!(
            "feature buffer has {} values, expected {batch} x {steps} x {feature_dim} = {expected}",
            features.len()
        );
    }
    Ok(Tensor::<B, 3>::from_data(
        TensorData::new(features.to_vec(), [batch, steps, feature_dim]),
        device,
    ))
}

pub fn collate_train<B: Backend>(batch: &TrainBatch, device: &B::Device) -> anyhow::Result<Tensor<B, 3>> {
    collate_features(&batch.features, batch.len(), batch.steps, batch.feature_dim, device)
}

pub fn collate_test<B: Backend>(batch: &TestBatch, device: &B::Device) -> anyhow::Result<Tensor<B, 3>> {
    collate_features(&batch.features, batch.len(), batch.steps, batch.feature_dim, device)
}

/// Copy a tensor back to the host as a flat `f32` buffer.
pub fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> anyhow::Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read tensor data: {e:?}"))
}

//! Shared temporal trunk applied to every window before the pyramid.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{MaxPool1d, MaxPool1dConfig};
use burn::nn::PaddingConfig1d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::{BASE_KERNEL, BASE_PADDING, POOL_KERNEL, POOL_PADDING, POOL_STRIDE};

fn pool() -> MaxPool1d {
    MaxPool1dConfig::new(POOL_KERNEL)
        .with_stride(POOL_STRIDE)
        .with_padding(PaddingConfig1d::Explicit(POOL_PADDING))
        .init()
}

/// Two conv + max-pool stages; downsamples time by 4.
#[derive(Module, Debug)]
pub struct FeatureBackbone<B: Backend> {
    conv1: Conv1d<B>,
    pool1: MaxPool1d,
    conv2: Conv1d<B>,
    pool2: MaxPool1d,
}

impl<B: Backend> FeatureBackbone<B> {
    pub fn new(feature_dim: usize, channels: usize, device: &B::Device) -> Self {
        let conv = |input| {
            Conv1dConfig::new(input, channels, BASE_KERNEL)
                .with_padding(PaddingConfig1d::Explicit(BASE_PADDING))
                .init(device)
        };
        Self {
            conv1: conv(feature_dim),
            pool1: pool(),
            conv2: conv(channels),
            pool2: pool(),
        }
    }

    /// `[batch, steps, feature_dim]` -> `[batch, channels, steps / 4]`.
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = features.swap_dims(1, 2);
        let x = self.pool1.forward(relu(self.conv1.forward(x)));
        self.pool2.forward(relu(self.conv2.forward(x)))
    }
}

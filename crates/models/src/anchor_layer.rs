use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::PaddingConfig1d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::{ANCHOR_KERNEL, ANCHOR_PADDING, ANCHOR_STRIDE};

/// Chain of stride-2 convolutions; each output is one pyramid level.
#[derive(Module, Debug)]
pub struct AnchorLayers<B: Backend> {
    layers: Vec<Conv1d<B>>,
}

impl<B: Backend> AnchorLayers<B> {
    pub fn new(levels: usize, in_channels: usize, channels: usize, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(levels);
        let mut input = in_channels;
        for _ in 0..levels {
            layers.push(
                Conv1dConfig::new(input, channels, ANCHOR_KERNEL)
                    .with_stride(ANCHOR_STRIDE)
                    .with_padding(PaddingConfig1d::Explicit(ANCHOR_PADDING))
                    .init(device),
            );
            input = channels;
        }
        Self { layers }
    }

    pub fn forward(&self, base: Tensor<B, 3>) -> Vec<Tensor<B, 3>> {
        let mut outputs = Vec::with_capacity(self.layers.len());
        let mut x = base;
        for layer in &self.layers {
            x = relu(layer.forward(x));
            outputs.push(x.clone());
        }
        outputs
    }
}

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::PaddingConfig1d;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::anchors::LevelSpec;
use crate::{HEAD_KERNEL, HEAD_PADDING};

/// Per-level prediction convolutions. Weights are not shared across levels.
#[derive(Module, Debug)]
pub struct PredictionHead<B: Backend> {
    convs: Vec<Conv1d<B>>,
    channels: usize,
}

impl<B: Backend> PredictionHead<B> {
    pub fn new(levels: usize, in_channels: usize, channels: usize, device: &B::Device) -> Self {
        let convs = (0..levels)
            .map(|_| {
                Conv1dConfig::new(in_channels, channels, HEAD_KERNEL)
                    .with_padding(PaddingConfig1d::Explicit(HEAD_PADDING))
                    .init(device)
            })
            .collect();
        Self { convs, channels }
    }

    /// `[batch, in_channels, positions]` -> `[batch, positions, num_classes + 3]`.
    pub fn forward(&self, features: Tensor<B, 3>, level: &LevelSpec) -> Tensor<B, 3> {
        self.convs[level.index].forward(features).swap_dims(1, 2)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn head_keeps_level_positions() {
        let device = Default::default();
        let head = PredictionHead::<NdArray<f32>>::new(2, 4, 7, &device);
        let level = LevelSpec {
            index: 1,
            name: "AL2".into(),
            positions: 5,
            offset: 9,
            prior_width: 0.25,
        };
        let features = Tensor::<NdArray<f32>, 3>::ones([2, 4, 5], &device);
        assert_eq!(head.forward(features, &level).dims(), [2, 5, 7]);
    }
}

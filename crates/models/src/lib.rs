//! Burn modules for single-shot temporal action detection.
//!
//! - `FeatureBackbone`: two conv/pool stages over per-step features.
//! - `AnchorLayers`: strided convolutions producing the temporal pyramid.
//! - `PredictionHead`: one convolution per pyramid level emitting class, confidence and offsets.
//! - `TemporalDetector`: the above wired together, emitting `[batch, anchors, num_classes + 3]`.
//!
//! Target assignment and losses live in the `training` crate; post-processing in `inference`.

pub mod anchor_layer;
pub mod anchors;
pub mod backbone;
pub mod head;

use burn::module::{Ignored, Module};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use data_contracts::config::ModelConfig;

pub use anchor_layer::AnchorLayers;
pub use anchors::{
    conv_out_len, decode_anchors, AnchorLayout, AnchorPredictions, LayoutError, LevelSpec,
    OffsetCoder, MAX_LOG_SCALE,
};
pub use backbone::FeatureBackbone;
pub use head::PredictionHead;

pub(crate) const BASE_KERNEL: usize = 9;
pub(crate) const BASE_PADDING: usize = 4;
pub(crate) const POOL_KERNEL: usize = 4;
pub(crate) const POOL_STRIDE: usize = 2;
pub(crate) const POOL_PADDING: usize = 1;
pub(crate) const ANCHOR_KERNEL: usize = 3;
pub(crate) const ANCHOR_STRIDE: usize = 2;
pub(crate) const ANCHOR_PADDING: usize = 1;
pub(crate) const HEAD_KERNEL: usize = 3;
pub(crate) const HEAD_PADDING: usize = 1;

#[derive(Module, Debug)]
pub struct TemporalDetector<B: Backend> {
    backbone: FeatureBackbone<B>,
    anchor_layers: AnchorLayers<B>,
    head: PredictionHead<B>,
    pub layout: Ignored<AnchorLayout>,
    pub feature_dim: usize,
}

impl<B: Backend> TemporalDetector<B> {
    pub fn new(cfg: &ModelConfig, feature_dim: usize, device: &B::Device) -> Result<Self, LayoutError> {
        let layout = AnchorLayout::new(cfg)?;
        let levels = layout.levels.len();
        Ok(Self {
            backbone: FeatureBackbone::new(feature_dim, cfg.base_channels, device),
            anchor_layers: AnchorLayers::new(levels, cfg.base_channels, cfg.anchor_channels, device),
            head: PredictionHead::new(levels, cfg.anchor_channels, layout.channels(), device),
            layout: Ignored(layout),
            feature_dim,
        })
    }

    pub fn layout(&self) -> &AnchorLayout {
        &self.layout.0
    }

    /// Raw per-anchor predictions for `[batch, steps, feature_dim]` input.
    ///
    /// Levels are written into a pre-sized `[batch, total, channels]` buffer at their layout offsets.
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, _, _] = features.dims();
        let device = features.device();
        let layout = self.layout();
        let channels = self.head.channels();

        let base = self.backbone.forward(features);
        let pyramid = self.anchor_layers.forward(base);

        let mut out = Tensor::<B, 3>::zeros([batch, layout.total, channels], &device);
        for (level_features, level) in pyramid.into_iter().zip(&layout.levels) {
            let level_out = self.head.forward(level_features, level);
            out = out.slice_assign([0..batch, level.range(), 0..channels], level_out);
        }
        out
    }

    /// Forward pass followed by anchor decoding.
    pub fn predict(&self, features: Tensor<B, 3>) -> AnchorPredictions<B> {
        decode_anchors(self.forward(features), self.layout())
    }
}

pub mod prelude {
    pub use super::{AnchorLayout, AnchorPredictions, LevelSpec, OffsetCoder, TemporalDetector};
}

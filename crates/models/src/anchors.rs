//! Anchor layout across pyramid levels, prior boxes, and offset decoding.
//!
//! Anchors are ordered level by level (configured order), positions ascending within a level.
//! Every consumer (detector output, decoding, training targets) indexes through the same
//! [`AnchorLayout`] offsets.

use burn::tensor::activation::sigmoid;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use data_contracts::config::ModelConfig;
use thiserror::Error;

use crate::{ANCHOR_KERNEL, ANCHOR_PADDING, ANCHOR_STRIDE};
use crate::{POOL_KERNEL, POOL_PADDING, POOL_STRIDE};

/// Clip on the scaled width offset before `exp` (ln(1000/16)).
pub const MAX_LOG_SCALE: f32 = 4.135_166_5;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("input of {input_steps} steps leaves no positions at level {level}")]
    EmptyLevel { level: String, input_steps: usize },
}

/// Output length of a 1-D convolution or pooling window.
pub fn conv_out_len(len: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    let padded = len + 2 * padding;
    if padded < kernel {
        0
    } else {
        (padded - kernel) / stride + 1
    }
}

/// One pyramid level: where its anchors live in the flattened anchor axis and its prior width.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSpec {
    pub index: usize,
    pub name: String,
    pub positions: usize,
    pub offset: usize,
    pub prior_width: f32,
}

impl LevelSpec {
    pub fn prior_center(&self, position: usize) -> f32 {
        (position as f32 + 0.5) / self.positions as f32
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.positions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnchorLayout {
    pub levels: Vec<LevelSpec>,
    /// Anchors per window summed over all levels.
    pub total: usize,
    pub num_classes: usize,
    pub offset_scale: f32,
}

impl AnchorLayout {
    pub fn new(cfg: &ModelConfig) -> Result<Self, LayoutError> {
        let mut len = cfg.input_steps;
        for _ in 0..2 {
            len = conv_out_len(len, POOL_KERNEL, POOL_STRIDE, POOL_PADDING);
        }
        let mut levels = Vec::with_capacity(cfg.levels.len());
        let mut offset = 0;
        for (index, level) in cfg.levels.iter().enumerate() {
            len = conv_out_len(len, ANCHOR_KERNEL, ANCHOR_STRIDE, ANCHOR_PADDING);
            if len == 0 {
                return Err(LayoutError::EmptyLevel {
                    level: level.name.clone(),
                    input_steps: cfg.input_steps,
                });
            }
            levels.push(LevelSpec {
                index,
                name: level.name.clone(),
                positions: len,
                offset,
                prior_width: level.anchor_scale,
            });
            offset += len;
        }
        Ok(Self {
            levels,
            total: offset,
            num_classes: cfg.num_classes,
            offset_scale: cfg.offset_scale,
        })
    }

    /// Width of the per-anchor output vector: class logits, confidence, dx, dw.
    pub fn channels(&self) -> usize {
        self.num_classes + 3
    }

    pub fn coder(&self) -> OffsetCoder {
        OffsetCoder::new(self.offset_scale)
    }

    /// Prior `(centers, widths)` for every anchor of one window.
    pub fn priors(&self) -> (Vec<f32>, Vec<f32>) {
        let mut centers = Vec::with_capacity(self.total);
        let mut widths = Vec::with_capacity(self.total);
        for level in &self.levels {
            for p in 0..level.positions {
                centers.push(level.prior_center(p));
                widths.push(level.prior_width);
            }
        }
        (centers, widths)
    }

    /// Priors repeated over the batch as `[batch, total]` tensors.
    pub fn prior_tensors<B: Backend>(
        &self,
        batch: usize,
        device: &B::Device,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (centers, widths) = self.priors();
        let repeat = |v: &[f32]| -> Vec<f32> {
            let mut out = Vec::with_capacity(batch * v.len());
            for _ in 0..batch {
                out.extend_from_slice(v);
            }
            out
        };
        let x = Tensor::<B, 2>::from_data(
            TensorData::new(repeat(&centers), [batch, self.total]),
            device,
        );
        let w = Tensor::<B, 2>::from_data(
            TensorData::new(repeat(&widths), [batch, self.total]),
            device,
        );
        (x, w)
    }
}

/// Scalar form of the anchor offset transform.
///
/// `x = prior_x + dx * prior_w * scale`, `w = prior_w * exp(dw * scale)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetCoder {
    pub scale: f32,
}

impl OffsetCoder {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn decode(&self, prior_x: f32, prior_w: f32, dx: f32, dw: f32) -> (f32, f32) {
        let x = prior_x + dx * prior_w * self.scale;
        let w = prior_w * (dw * self.scale).min(MAX_LOG_SCALE).exp();
        (x, w)
    }

    pub fn encode(&self, prior_x: f32, prior_w: f32, x: f32, w: f32) -> (f32, f32) {
        let dx = (x - prior_x) / (prior_w * self.scale);
        let dw = (w / prior_w).ln() / self.scale;
        (dx, dw)
    }
}

/// Decoded per-anchor predictions for a batch (`anchor_box_adjust`).
#[derive(Debug, Clone)]
pub struct AnchorPredictions<B: Backend> {
    /// Class logits before softmax, `[batch, anchors, num_classes]`.
    pub class_logits: Tensor<B, 3>,
    /// Sigmoid confidence, `[batch, anchors]`.
    pub confidence: Tensor<B, 2>,
    pub center: Tensor<B, 2>,
    pub width: Tensor<B, 2>,
}

impl<B: Backend> AnchorPredictions<B> {
    pub fn xmin(&self) -> Tensor<B, 2> {
        self.center.clone() - self.width.clone().mul_scalar(0.5)
    }

    pub fn xmax(&self) -> Tensor<B, 2> {
        self.center.clone() + self.width.clone().mul_scalar(0.5)
    }
}

/// Apply predicted offsets to the layout priors. Expects `[batch, layout.total, layout.channels()]`.
pub fn decode_anchors<B: Backend>(raw: Tensor<B, 3>, layout: &AnchorLayout) -> AnchorPredictions<B> {
    let [batch, anchors, channels] = raw.dims();
    debug_assert_eq!(anchors, layout.total);
    debug_assert_eq!(channels, layout.channels());
    let ncls = layout.num_classes;
    let device = raw.device();

    let column = |c: usize| {
        raw.clone()
            .slice([0..batch, 0..anchors, c..c + 1])
            .reshape([batch, anchors])
    };
    let conf_logit = column(ncls);
    let dx = column(ncls + 1);
    let dw = column(ncls + 2);
    let class_logits = raw.slice([0..batch, 0..anchors, 0..ncls]);

    let (prior_x, prior_w) = layout.prior_tensors::<B>(batch, &device);
    let scale = layout.offset_scale;
    let center = dx * prior_w.clone() * scale + prior_x;
    let width = (dw * scale).clamp_max(MAX_LOG_SCALE).exp() * prior_w;

    AnchorPredictions {
        class_logits,
        confidence: sigmoid(conf_logit),
        center,
        width,
    }
}

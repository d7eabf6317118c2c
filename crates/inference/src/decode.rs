use burn::tensor::activation::softmax;
use burn::tensor::{backend::Backend, Tensor};
use models::{AnchorPredictions, TemporalDetector};

/// Per-anchor inference output for a batch, host-side and row-major over `b * anchors + a`.
///
/// Boundaries are in window frame units (normalized values times `window_size`).
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutput {
    pub batch: usize,
    pub anchors: usize,
    pub num_classes: usize,
    /// Softmax class probabilities, `num_classes` per anchor.
    pub probs: Vec<f32>,
    pub conf: Vec<f32>,
    pub xmin: Vec<f32>,
    pub xmax: Vec<f32>,
}

impl DetectionOutput {
    pub fn from_predictions<B: Backend>(
        predictions: AnchorPredictions<B>,
        window_size: f32,
    ) -> anyhow::Result<Self> {
        let [batch, anchors, num_classes] = predictions.class_logits.dims();
        let xmin = predictions.xmin().mul_scalar(window_size);
        let xmax = predictions.xmax().mul_scalar(window_size);
        let probs = softmax(predictions.class_logits, 2);
        Ok(Self {
            batch,
            anchors,
            num_classes,
            probs: training::to_host(probs)?,
            conf: training::to_host(predictions.confidence)?,
            xmin: training::to_host(xmin)?,
            xmax: training::to_host(xmax)?,
        })
    }

    pub fn probs_of(&self, row: usize) -> &[f32] {
        &self.probs[row * self.num_classes..(row + 1) * self.num_classes]
    }
}

/// Forward, decode and convert one batch to window frame units (`test_operation`).
pub fn test_operation<B: Backend>(
    model: &TemporalDetector<B>,
    features: Tensor<B, 3>,
    window_size: f32,
) -> anyhow::Result<DetectionOutput> {
    DetectionOutput::from_predictions(model.predict(features), window_size)
}

use burn::tensor::activation::log_softmax;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use data_contracts::LossConfig;
use models::AnchorPredictions;

use crate::sampling::AnchorSelection;
use crate::targets::AnchorTargets;

/// Loss terms as scalar tensors (`[1]`); `total` carries the gradient.
#[derive(Debug, Clone)]
pub struct DetectionLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub class: Tensor<B, 1>,
    pub loc: Tensor<B, 1>,
    pub conf: Tensor<B, 1>,
    pub positives: usize,
    pub sampled: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossSummary {
    pub total: f32,
    pub class: f32,
    pub loc: f32,
    pub conf: f32,
}

impl<B: Backend> DetectionLoss<B> {
    pub fn summary(&self) -> LossSummary {
        LossSummary {
            total: scalar(&self.total),
            class: scalar(&self.class),
            loc: scalar(&self.loc),
            conf: scalar(&self.conf),
        }
    }
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone()
        .detach()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(0.0)
}

/// `0.5 x^2` for `|x| < 1`, else `|x| - 0.5`.
pub fn smooth_l1<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let abs = x.abs();
    let clipped = abs.clone().clamp_max(1.0);
    (abs.clone().sub_scalar(1.0) * clipped + abs).mul_scalar(0.5)
}

fn masked_mean<B: Backend>(values: Tensor<B, 2>, mask: Tensor<B, 2>, count: usize) -> Tensor<B, 1> {
    if count == 0 {
        return Tensor::<B, 1>::zeros([1], &values.device());
    }
    (values * mask).sum().div_scalar(count as f32)
}

/// Classification, localization and confidence terms over the selected anchors.
///
/// Classification and confidence average over `selection`; localization over positives only.
pub fn detection_loss<B: Backend>(
    predictions: &AnchorPredictions<B>,
    targets: &AnchorTargets,
    selection: &AnchorSelection,
    cfg: &LossConfig,
) -> DetectionLoss<B> {
    let [batch, anchors, classes] = predictions.class_logits.dims();
    let device = predictions.confidence.device();
    let dense2 = |v: Vec<f32>| Tensor::<B, 2>::from_data(TensorData::new(v, [batch, anchors]), &device);

    let sample_mask = dense2(selection.mask(targets.len()));
    let positive: Vec<f32> = targets
        .positive
        .iter()
        .map(|p| if *p { 1.0 } else { 0.0 })
        .collect();
    let positive_mask = dense2(positive);

    let one_hot = Tensor::<B, 3>::from_data(
        TensorData::new(targets.one_hot(classes), [batch, anchors, classes]),
        &device,
    );
    let log_probs = log_softmax(predictions.class_logits.clone(), 2);
    let ce = (one_hot * log_probs)
        .sum_dim(2)
        .reshape([batch, anchors])
        .neg();
    let class = masked_mean(ce, sample_mask.clone(), selection.len());

    let (match_xmin, match_xmax) = targets.match_bounds();
    let loc_err = smooth_l1(predictions.xmin() - dense2(match_xmin))
        + smooth_l1(predictions.xmax() - dense2(match_xmax));
    let positives = targets.num_positive();
    let loc = masked_mean(loc_err, positive_mask, positives);

    let conf_err = smooth_l1(predictions.confidence.clone() - dense2(targets.bm_scores.clone()));
    let conf = masked_mean(conf_err, sample_mask, selection.len());

    let total = class.clone() + loc.clone().mul_scalar(cfg.p_loc) + conf.clone().mul_scalar(cfg.p_conf);
    DetectionLoss {
        total,
        class,
        loc,
        conf,
        positives,
        sampled: selection.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn predictions(logits: [[f32; 3]; 3], conf: [f32; 3], center: [f32; 3]) -> AnchorPredictions<B> {
        let device = Default::default();
        let logits: Vec<f32> = logits.iter().flatten().copied().collect();
        let row = |v: [f32; 3]| Tensor::<B, 2>::from_data(TensorData::new(v.to_vec(), [1, 3]), &device);
        AnchorPredictions {
            class_logits: Tensor::<B, 3>::from_data(TensorData::new(logits, [1, 3, 3]), &device),
            confidence: row(conf),
            center: row(center),
            width: row([0.2; 3]),
        }
    }

    /// Anchor 0 positive on `[0.4, 0.6]` with label 1 and IoU 0.9; anchor 1 background with a
    /// far-away matched box; anchor 2 background.
    fn targets() -> AnchorTargets {
        let mut t = AnchorTargets::background(1, 3);
        t.positive[0] = true;
        t.bm_labels[0] = 1;
        t.bm_x[0] = 0.5;
        t.bm_w[0] = 0.2;
        t.bm_scores[0] = 0.9;
        t.bm_x[1] = 10.0;
        t.bm_w[1] = 1.0;
        t
    }

    fn sampled() -> AnchorSelection {
        AnchorSelection {
            positives: vec![0],
            negatives: vec![1],
        }
    }

    fn value(t: &Tensor<B, 1>) -> f32 {
        t.clone().into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn localization_ignores_non_positive_anchors() {
        let preds = predictions([[0.0; 3]; 3], [0.9, 0.2, 0.5], [0.5, 0.3, 0.7]);
        let loss = detection_loss(&preds, &targets(), &sampled(), &LossConfig::default());
        assert_eq!(loss.positives, 1);
        assert_eq!(loss.sampled, 2);
        assert!(value(&loss.loc).abs() < 1e-6);
        // Uniform logits: every sampled anchor costs ln 3.
        assert!((value(&loss.class) - 3.0f32.ln()).abs() < 1e-5);
        // Anchor 0 is exact; anchor 1 misses its 0 target by 0.2; anchor 2 is not sampled.
        assert!((value(&loss.conf) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn terms_are_weighted_by_config() {
        let preds = predictions([[0.0; 3]; 3], [0.5, 0.2, 0.5], [0.6, 0.3, 0.7]);
        let cfg = LossConfig {
            p_loc: 3.0,
            p_conf: 0.5,
            ..Default::default()
        };
        let loss = detection_loss(&preds, &targets(), &sampled(), &cfg);
        let summary = loss.summary();
        // Both boundaries of anchor 0 are off by 0.1.
        assert!((summary.loc - 0.01).abs() < 1e-5);
        let expected = summary.class + 3.0 * summary.loc + 0.5 * summary.conf;
        assert!((summary.total - expected).abs() < 1e-5);
    }

    #[test]
    fn empty_selection_gives_zero_terms() {
        let preds = predictions([[0.0; 3]; 3], [0.5; 3], [0.5; 3]);
        let targets = AnchorTargets::background(1, 3);
        let loss = detection_loss(&preds, &targets, &AnchorSelection::default(), &LossConfig::default());
        assert_eq!(loss.summary(), LossSummary::default());
    }

    #[test]
    fn perfect_prediction_has_near_zero_loss() {
        let logits = [[0.0, 30.0, 0.0], [30.0, 0.0, 0.0], [30.0, 0.0, 0.0]];
        let preds = predictions(logits, [0.9, 0.0, 0.0], [0.5, 0.3, 0.7]);
        let loss = detection_loss(&preds, &targets(), &sampled(), &LossConfig::default());
        assert!(value(&loss.total).abs() < 1e-5, "total {}", value(&loss.total));

        // With zero weights only classification remains, whatever the box and confidence errors.
        let off = predictions(logits, [0.1, 0.8, 0.0], [0.9, 0.3, 0.7]);
        let cfg = LossConfig {
            p_loc: 0.0,
            p_conf: 0.0,
            ..Default::default()
        };
        let loss = detection_loss(&off, &targets(), &sampled(), &cfg);
        assert!(value(&loss.total).abs() < 1e-5);
        assert!(value(&loss.loc) > 0.0 && value(&loss.conf) > 0.0);
    }

    #[test]
    fn smooth_l1_switches_at_one() {
        let device = Default::default();
        let x = Tensor::<B, 1>::from_data(TensorData::new(vec![-2.0f32, -0.5, 0.0, 0.5, 3.0], [5]), &device);
        let y = smooth_l1(x).into_data().to_vec::<f32>().unwrap();
        let expected = [1.5, 0.125, 0.0, 0.125, 2.5];
        for (a, b) in y.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }
}

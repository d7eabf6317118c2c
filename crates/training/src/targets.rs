//! Anchor-to-ground-truth matching and boundary-match (BM) target encoding.
//!
//! Matching runs on the host against the *decoded* predicted anchors of the current step,
//! the same way box matching is done for the image detectors: pull predictions with
//! `into_data`, match in plain loops, push dense targets back as tensors.

use data_contracts::{
    segment_iou, GroundTruthBatch, MatchingConfig, ValidationError, BACKGROUND_CLASS,
};
use models::{AnchorLayout, LevelSpec, OffsetCoder};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("invalid ground truth: {0}")]
    InvalidGroundTruth(#[from] ValidationError),
    #[error("prediction buffer holds {actual} values, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Dense per-anchor targets for a batch, flattened as `b * anchors + a`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTargets {
    pub batch: usize,
    pub anchors: usize,
    /// Matched ground-truth center.
    pub bm_x: Vec<f32>,
    /// Matched ground-truth width.
    pub bm_w: Vec<f32>,
    /// Matched box re-encoded against the anchor prior (`OffsetCoder::encode`).
    ///
    /// Not read by the loss, which compares decoded boundaries through `match_bounds`;
    /// kept for inspecting targets in offset space.
    pub bm_dx: Vec<f32>,
    pub bm_dw: Vec<f32>,
    pub bm_labels: Vec<usize>,
    /// Confidence target: IoU with the matched ground truth (0 for background).
    pub bm_scores: Vec<f32>,
    pub positive: Vec<bool>,
    /// Between the thresholds: not positive, never sampled as a negative.
    pub ignored: Vec<bool>,
}

impl AnchorTargets {
    pub fn background(batch: usize, anchors: usize) -> Self {
        let n = batch * anchors;
        Self {
            batch,
            anchors,
            bm_x: vec![0.0; n],
            bm_w: vec![0.0; n],
            bm_dx: vec![0.0; n],
            bm_dw: vec![0.0; n],
            bm_labels: vec![BACKGROUND_CLASS; n],
            bm_scores: vec![0.0; n],
            positive: vec![false; n],
            ignored: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.batch * self.anchors
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn item_range(&self, b: usize) -> std::ops::Range<usize> {
        b * self.anchors..(b + 1) * self.anchors
    }

    pub fn num_positive(&self) -> usize {
        self.positive.iter().filter(|p| **p).count()
    }

    /// `bm_labels` as a dense one-hot `[batch * anchors, num_classes]` buffer.
    pub fn one_hot(&self, num_classes: usize) -> Vec<f32> {
        let mut out = vec![0.0; self.len() * num_classes];
        for (i, &label) in self.bm_labels.iter().enumerate() {
            if label < num_classes {
                out[i * num_classes + label] = 1.0;
            }
        }
        out
    }

    /// Matched ground-truth boundaries `(xmin, xmax)` per anchor.
    pub fn match_bounds(&self) -> (Vec<f32>, Vec<f32>) {
        self.bm_x
            .iter()
            .zip(&self.bm_w)
            .map(|(x, w)| (x - w / 2.0, x + w / 2.0))
            .unzip()
    }

    fn set_match(&mut self, i: usize, prior: (f32, f32), gt: [f32; 2], coder: &OffsetCoder) {
        let x = (gt[0] + gt[1]) / 2.0;
        let w = gt[1] - gt[0];
        let (dx, dw) = coder.encode(prior.0, prior.1, x, w);
        self.bm_x[i] = x;
        self.bm_w[i] = w;
        self.bm_dx[i] = dx;
        self.bm_dw[i] = dw;
    }
}

/// Match one pyramid level of batch item `b` and write its slice of `targets`.
///
/// `centers`/`widths` hold the decoded predictions of the whole batch.
#[allow(clippy::too_many_arguments)]
pub fn encode_level(
    targets: &mut AnchorTargets,
    b: usize,
    level: &LevelSpec,
    coder: &OffsetCoder,
    centers: &[f32],
    widths: &[f32],
    labels: &[usize],
    bboxes: &[[f32; 2]],
    matching: &MatchingConfig,
) {
    if bboxes.is_empty() {
        return;
    }
    for (position, a) in level.range().enumerate() {
        let i = b * targets.anchors + a;
        let pred = [centers[i] - widths[i] / 2.0, centers[i] + widths[i] / 2.0];
        let mut best_iou = 0.0f32;
        let mut best_gt = None;
        for (g, gt) in bboxes.iter().enumerate() {
            let iou = segment_iou(pred, *gt);
            if iou > best_iou {
                best_iou = iou;
                best_gt = Some(g);
            }
        }
        let Some(g) = best_gt else {
            continue;
        };
        if best_iou < matching.neg_iou_threshold {
            continue;
        }
        let prior = (level.prior_center(position), level.prior_width);
        targets.set_match(i, prior, bboxes[g], coder);
        targets.bm_scores[i] = best_iou;
        if best_iou >= matching.pos_iou_threshold {
            targets.positive[i] = true;
            targets.bm_labels[i] = labels[g];
        } else {
            targets.ignored[i] = true;
        }
    }
}

/// Build BM targets for a whole batch from decoded predictions (`[batch * total]` each).
pub fn assign_targets(
    layout: &AnchorLayout,
    centers: &[f32],
    widths: &[f32],
    ground_truth: &GroundTruthBatch,
    batch: usize,
    matching: &MatchingConfig,
) -> Result<AnchorTargets, TargetError> {
    ground_truth.validate(batch, layout.num_classes)?;
    let expected = batch * layout.total;
    for actual in [centers.len(), widths.len()] {
        if actual != expected {
            return Err(TargetError::ShapeMismatch { expected, actual });
        }
    }

    let coder = layout.coder();
    let mut targets = AnchorTargets::background(batch, layout.total);
    for b in 0..batch {
        let (labels, bboxes) = ground_truth.item(b);
        for level in &layout.levels {
            encode_level(
                &mut targets,
                b,
                level,
                &coder,
                centers,
                widths,
                labels,
                bboxes,
                matching,
            );
        }
        if matching.force_best_match {
            force_best_anchors(&mut targets, layout, &coder, b, centers, widths, labels, bboxes);
        }
    }
    Ok(targets)
}

/// Make each ground truth's best anchor positive, even below the positive threshold.
///
/// Ground truths are visited in batch order; when two share a best anchor the later one keeps it.
#[allow(clippy::too_many_arguments)]
fn force_best_anchors(
    targets: &mut AnchorTargets,
    layout: &AnchorLayout,
    coder: &OffsetCoder,
    b: usize,
    centers: &[f32],
    widths: &[f32],
    labels: &[usize],
    bboxes: &[[f32; 2]],
) {
    for (gt, &label) in bboxes.iter().zip(labels) {
        let mut best: Option<(usize, &LevelSpec, usize, f32)> = None;
        for level in &layout.levels {
            for (position, a) in level.range().enumerate() {
                let i = b * targets.anchors + a;
                let pred = [centers[i] - widths[i] / 2.0, centers[i] + widths[i] / 2.0];
                let iou = segment_iou(pred, *gt);
                if iou > best.map_or(0.0, |(.., v)| v) {
                    best = Some((i, level, position, iou));
                }
            }
        }
        let Some((i, level, position, iou)) = best else {
            continue;
        };
        targets.set_match(i, (level.prior_center(position), level.prior_width), *gt, coder);
        targets.bm_scores[i] = iou;
        targets.bm_labels[i] = label;
        targets.positive[i] = true;
        targets.ignored[i] = false;
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::segment::WindowMeta;
use crate::BACKGROUND_CLASS;

/// One labelled action instance, normalized to its window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthSegment {
    pub start: f32,
    pub end: f32,
    pub label: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("index has {actual} entries, expected batch size + 1 = {expected}")]
    IndexLength { expected: usize, actual: usize },
    #[error("index must start at 0, found {0}")]
    IndexStart(usize),
    #[error("index decreases at position {position}: {prev} -> {next}")]
    IndexDecreasing {
        position: usize,
        prev: usize,
        next: usize,
    },
    #[error("index ends at {end} but there are {labels} labels and {bboxes} bboxes")]
    IndexEnd {
        end: usize,
        labels: usize,
        bboxes: usize,
    },
    #[error("label {label} at row {row} outside foreground classes 1..{num_classes}")]
    LabelOutOfRange {
        row: usize,
        label: usize,
        num_classes: usize,
    },
    #[error("segment at row {row} is empty, reversed or not finite: {bbox:?}")]
    InvalidSegment { row: usize, bbox: [f32; 2] },
}

/// Ground truth for a batch of windows, flattened with prefix-sum boundaries.
///
/// Rows `index[b]..index[b + 1]` of `labels`/`bboxes` belong to batch item `b`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthBatch {
    pub labels: Vec<usize>,
    pub bboxes: Vec<[f32; 2]>,
    pub index: Vec<usize>,
}

impl GroundTruthBatch {
    pub fn from_items(items: &[Vec<GroundTruthSegment>]) -> Self {
        let mut labels = Vec::new();
        let mut bboxes = Vec::new();
        let mut index = Vec::with_capacity(items.len() + 1);
        index.push(0);
        for segments in items {
            for seg in segments {
                labels.push(seg.label);
                bboxes.push([seg.start, seg.end]);
            }
            index.push(labels.len());
        }
        Self {
            labels,
            bboxes,
            index,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.index.len().saturating_sub(1)
    }

    /// Labels and bboxes of batch item `b`. Assumes a validated batch.
    pub fn item(&self, b: usize) -> (&[usize], &[[f32; 2]]) {
        let range = self.index[b]..self.index[b + 1];
        (&self.labels[range.clone()], &self.bboxes[range])
    }

    pub fn validate(&self, batch_size: usize, num_classes: usize) -> Result<(), ValidationError> {
        if self.index.len() != batch_size + 1 {
            return Err(ValidationError::IndexLength {
                expected: batch_size + 1,
                actual: self.index.len(),
            });
        }
        if self.index[0] != 0 {
            return Err(ValidationError::IndexStart(self.index[0]));
        }
        for (position, pair) in self.index.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(ValidationError::IndexDecreasing {
                    position: position + 1,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        let end = self.index[batch_size];
        if end != self.labels.len() || end != self.bboxes.len() {
            return Err(ValidationError::IndexEnd {
                end,
                labels: self.labels.len(),
                bboxes: self.bboxes.len(),
            });
        }
        for (row, (&label, &bbox)) in self.labels.iter().zip(&self.bboxes).enumerate() {
            if label == BACKGROUND_CLASS || label >= num_classes {
                return Err(ValidationError::LabelOutOfRange {
                    row,
                    label,
                    num_classes,
                });
            }
            if !bbox[0].is_finite() || !bbox[1].is_finite() || bbox[1] <= bbox[0] {
                return Err(ValidationError::InvalidSegment { row, bbox });
            }
        }
        Ok(())
    }
}

/// Training batch: features `[batch, steps, feature_dim]` (row-major) plus ground truth.
#[derive(Debug, Clone)]
pub struct TrainBatch {
    pub features: Vec<f32>,
    pub steps: usize,
    pub feature_dim: usize,
    pub windows: Vec<WindowMeta>,
    pub ground_truth: GroundTruthBatch,
}

impl TrainBatch {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Inference batch: features plus the window placement needed for un-windowing.
#[derive(Debug, Clone)]
pub struct TestBatch {
    pub features: Vec<f32>,
    pub steps: usize,
    pub feature_dim: usize,
    pub windows: Vec<WindowMeta>,
}

impl TestBatch {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f32, end: f32, label: usize) -> GroundTruthSegment {
        GroundTruthSegment { start, end, label }
    }

    #[test]
    fn from_items_builds_prefix_sums() {
        let gt = GroundTruthBatch::from_items(&[
            vec![seg(0.1, 0.2, 1), seg(0.3, 0.5, 2)],
            vec![],
            vec![seg(0.0, 1.0, 3)],
        ]);
        assert_eq!(gt.index, vec![0, 2, 2, 3]);
        assert_eq!(gt.batch_size(), 3);
        assert!(gt.validate(3, 4).is_ok());
        let (labels, boxes) = gt.item(1);
        assert!(labels.is_empty() && boxes.is_empty());
        assert_eq!(gt.item(2).0, &[3]);
    }

    #[test]
    fn index_must_start_at_zero() {
        let gt = GroundTruthBatch {
            labels: vec![1],
            bboxes: vec![[0.1, 0.2]],
            index: vec![1, 1],
        };
        assert_eq!(gt.validate(1, 4), Err(ValidationError::IndexStart(1)));
    }

    #[test]
    fn decreasing_index_rejected() {
        let gt = GroundTruthBatch {
            labels: vec![1, 1],
            bboxes: vec![[0.1, 0.2], [0.3, 0.4]],
            index: vec![0, 2, 1],
        };
        assert!(matches!(
            gt.validate(2, 4),
            Err(ValidationError::IndexDecreasing { position: 2, .. })
        ));
    }

    #[test]
    fn index_end_must_cover_rows() {
        let gt = GroundTruthBatch {
            labels: vec![1, 2],
            bboxes: vec![[0.1, 0.2], [0.3, 0.4]],
            index: vec![0, 1],
        };
        assert!(matches!(
            gt.validate(1, 4),
            Err(ValidationError::IndexEnd { end: 1, .. })
        ));
    }

    #[test]
    fn background_and_overflow_labels_rejected() {
        let gt = GroundTruthBatch::from_items(&[vec![seg(0.1, 0.2, 0)]]);
        assert!(matches!(
            gt.validate(1, 4),
            Err(ValidationError::LabelOutOfRange { label: 0, .. })
        ));
        let gt = GroundTruthBatch::from_items(&[vec![seg(0.1, 0.2, 4)]]);
        assert!(gt.validate(1, 4).is_err());
    }

    #[test]
    fn reversed_segment_rejected() {
        let gt = GroundTruthBatch::from_items(&[vec![seg(0.5, 0.2, 1)]]);
        assert!(matches!(
            gt.validate(1, 4),
            Err(ValidationError::InvalidSegment { row: 0, .. })
        ));
    }
}

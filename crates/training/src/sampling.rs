use data_contracts::LossConfig;

use crate::targets::AnchorTargets;

/// Anchors contributing to the classification and confidence terms, as flat `b * anchors + a`
/// indices in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorSelection {
    pub positives: Vec<usize>,
    pub negatives: Vec<usize>,
}

impl AnchorSelection {
    pub fn len(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dense 0/1 mask over `len` anchors for the union of both sets.
    pub fn mask(&self, len: usize) -> Vec<f32> {
        let mut mask = vec![0.0; len];
        for &i in self.positives.iter().chain(&self.negatives) {
            mask[i] = 1.0;
        }
        mask
    }
}

/// Hard-negative mining per batch item.
///
/// Keeps every positive plus the eligible negatives with the largest confidence error
/// `|confidence - bm_score|`, `max(ceil(ratio * positives), min_negatives)` of them.
/// Ties go to the lower anchor index.
pub fn select_anchors(targets: &AnchorTargets, confidence: &[f32], cfg: &LossConfig) -> AnchorSelection {
    let mut selection = AnchorSelection::default();
    for b in 0..targets.batch {
        let range = targets.item_range(b);
        let mut negatives = Vec::new();
        let mut positives = 0usize;
        for i in range {
            if targets.positive[i] {
                selection.positives.push(i);
                positives += 1;
            } else if !targets.ignored[i] {
                negatives.push((i, (confidence[i] - targets.bm_scores[i]).abs()));
            }
        }
        let wanted = ((cfg.negative_ratio * positives as f32).ceil() as usize).max(cfg.min_negatives);
        negatives.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut picked: Vec<usize> = negatives.into_iter().take(wanted).map(|(i, _)| i).collect();
        picked.sort_unstable();
        selection.negatives.extend(picked);
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(ratio: f32, min: usize) -> LossConfig {
        LossConfig {
            negative_ratio: ratio,
            min_negatives: min,
            ..Default::default()
        }
    }

    #[test]
    fn hardest_negatives_are_kept() {
        let mut t = AnchorTargets::background(1, 6);
        t.positive[2] = true;
        t.bm_scores[2] = 0.9;
        t.ignored[4] = true;
        let conf = [0.1, 0.8, 0.5, 0.3, 0.99, 0.8];
        let s = select_anchors(&t, &conf, &cfg(2.0, 0));
        assert_eq!(s.positives, vec![2]);
        // 1 and 5 tie at 0.8; anchor 4 is ignored despite the largest error.
        assert_eq!(s.negatives, vec![1, 5]);
    }

    #[test]
    fn min_negatives_applies_without_positives() {
        let t = AnchorTargets::background(2, 3);
        let conf = [0.2, 0.1, 0.3, 0.0, 0.0, 0.0];
        let s = select_anchors(&t, &conf, &cfg(1.0, 2));
        assert!(s.positives.is_empty());
        assert_eq!(s.negatives, vec![0, 2, 3, 4]);
        assert_eq!(s.mask(6), vec![1.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn selection_is_bounded_by_eligible_anchors() {
        let mut t = AnchorTargets::background(1, 3);
        t.positive[0] = true;
        t.ignored[1] = true;
        let s = select_anchors(&t, &[0.5, 0.5, 0.5], &cfg(3.0, 10));
        assert_eq!(s.len(), 2);
        assert_eq!(s.negatives, vec![2]);
    }
}

//! Fixed-length sliding windows over per-step video features.

use data_contracts::GroundTruthSegment;

use crate::types::Annotation;

/// Training window starts (in steps): full windows only, one padded window for short videos.
pub fn train_window_starts(num_steps: usize, input_steps: usize, stride: usize) -> Vec<usize> {
    if num_steps <= input_steps {
        return vec![0];
    }
    (0..=num_steps - input_steps).step_by(stride.max(1)).collect()
}

/// Test window starts (in steps): slide until the whole video is covered.
pub fn test_window_starts(num_steps: usize, input_steps: usize, stride: usize) -> Vec<usize> {
    let mut starts = vec![0];
    let mut start = 0;
    while start + input_steps < num_steps {
        start += stride.max(1);
        starts.push(start);
    }
    starts
}

/// Copy `input_steps` rows starting at `start`, zero-padding past the end of the video.
pub fn extract_window(
    features: &[f32],
    num_steps: usize,
    feature_dim: usize,
    start: usize,
    input_steps: usize,
) -> Vec<f32> {
    let mut out = vec![0.0; input_steps * feature_dim];
    let end = (start + input_steps).min(num_steps);
    if start < end {
        let rows = end - start;
        out[..rows * feature_dim]
            .copy_from_slice(&features[start * feature_dim..end * feature_dim]);
    }
    out
}

/// Annotations clipped to `[window_start, window_start + window_len)` and normalized to the window.
///
/// An annotation is kept when at least `min_coverage` of its length falls inside the window.
pub fn window_ground_truth(
    annotations: &[Annotation],
    window_start: f32,
    window_len: f32,
    min_coverage: f32,
) -> Vec<GroundTruthSegment> {
    let window_end = window_start + window_len;
    annotations
        .iter()
        .filter_map(|ann| {
            let start = ann.start.max(window_start);
            let end = ann.end.min(window_end);
            let clipped = end - start;
            if clipped <= 0.0 || clipped / (ann.end - ann.start) < min_coverage {
                return None;
            }
            Some(GroundTruthSegment {
                start: (start - window_start) / window_len,
                end: (end - window_start) / window_len,
                label: ann.label,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_starts_cover_full_windows() {
        assert_eq!(train_window_starts(10, 4, 2), vec![0, 2, 4, 6]);
        assert_eq!(train_window_starts(9, 4, 2), vec![0, 2, 4]);
        assert_eq!(train_window_starts(3, 4, 2), vec![0]);
    }

    #[test]
    fn test_starts_reach_the_tail() {
        assert_eq!(test_window_starts(10, 4, 2), vec![0, 2, 4, 6]);
        assert_eq!(test_window_starts(9, 4, 2), vec![0, 2, 4, 6]);
        assert_eq!(test_window_starts(4, 4, 2), vec![0]);
        assert_eq!(test_window_starts(2, 4, 2), vec![0]);
    }

    #[test]
    fn windows_are_zero_padded() {
        let features: Vec<f32> = (0..6).map(|v| v as f32).collect();
        // 3 steps x 2 dims
        assert_eq!(extract_window(&features, 3, 2, 1, 3), vec![2.0, 3.0, 4.0, 5.0, 0.0, 0.0]);
        assert_eq!(extract_window(&features, 3, 2, 5, 1), vec![0.0, 0.0]);
    }

    #[test]
    fn ground_truth_is_clipped_and_filtered() {
        let anns = [
            Annotation {
                start: 10.0,
                end: 30.0,
                label: 1,
            },
            Annotation {
                start: 90.0,
                end: 130.0,
                label: 2,
            },
            Annotation {
                start: 95.0,
                end: 101.0,
                label: 3,
            },
        ];
        let gt = window_ground_truth(&anns, 0.0, 100.0, 0.75);
        assert_eq!(gt.len(), 2);
        assert_eq!(gt[0].label, 1);
        assert!((gt[0].start - 0.1).abs() < 1e-6 && (gt[0].end - 0.3).abs() < 1e-6);
        // 5 of 6 frames inside.
        assert_eq!(gt[1].label, 3);
        assert!((gt[1].end - 1.0).abs() < 1e-6);
    }
}

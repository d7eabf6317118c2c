use serde::{Deserialize, Serialize};

/// Placement of one fixed-length window inside its source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMeta {
    pub video: String,
    /// Absolute offset of the first frame covered by the window.
    pub start: f32,
    /// Window length in frames.
    pub length: f32,
}

/// Final ranked detection over a full video, in absolute frame units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub video_name: String,
    pub class: usize,
    pub score: f32,
    pub start: f32,
    pub end: f32,
}

/// Intersection-over-union of two `[start, end]` intervals.
///
/// Endpoints may be given in either order. Degenerate unions yield 0.
pub fn segment_iou(a: [f32; 2], b: [f32; 2]) -> f32 {
    let (a0, a1) = (a[0].min(a[1]), a[0].max(a[1]));
    let (b0, b1) = (b[0].min(b[1]), b[0].max(b[1]));
    let inter = (a1.min(b1) - a0.max(b0)).max(0.0);
    let union = (a1 - a0) + (b1 - b0) - inter;
    if union <= 0.0 || !union.is_finite() {
        0.0
    } else {
        (inter / union).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_segments_is_one() {
        assert!((segment_iou([0.2, 0.6], [0.2, 0.6]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_is_symmetric_and_bounded() {
        let pairs = [
            ([0.0, 0.5], [0.25, 0.75]),
            ([0.1, 0.2], [0.5, 0.9]),
            ([0.0, 1.0], [0.4, 0.45]),
            ([0.3, 0.31], [0.305, 2.0]),
        ];
        for (a, b) in pairs {
            let ab = segment_iou(a, b);
            let ba = segment_iou(b, a);
            assert_eq!(ab, ba);
            assert!((0.0..=1.0).contains(&ab), "iou {ab} out of range");
        }
        assert!((segment_iou([0.0, 0.5], [0.25, 0.75]) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(segment_iou([0.1, 0.2], [0.5, 0.9]), 0.0);
    }

    #[test]
    fn zero_width_union_is_zero() {
        assert_eq!(segment_iou([0.4, 0.4], [0.4, 0.4]), 0.0);
    }
}

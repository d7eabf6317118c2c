use burn::backend::{ndarray::NdArray, Autodiff};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use data_contracts::{
    segment_iou, GroundTruthBatch, GroundTruthSegment, LevelConfig, MatchingConfig, ModelConfig,
    ValidationError, BACKGROUND_CLASS,
};
use models::TemporalDetector;
use training::{assign_targets, to_host, TargetError};

type ADBackend = Autodiff<NdArray<f32>>;

fn tiny_model_config() -> ModelConfig {
    ModelConfig {
        num_classes: 5,
        input_steps: 32,
        base_channels: 8,
        anchor_channels: 8,
        levels: vec![
            LevelConfig::new("AL1", 0.125),
            LevelConfig::new("AL2", 0.25),
            LevelConfig::new("AL3", 0.5),
        ],
        ..Default::default()
    }
}

fn decoded(model: &TemporalDetector<ADBackend>, features: Vec<f32>, batch: usize) -> (Vec<f32>, Vec<f32>) {
    let device = <ADBackend as Backend>::Device::default();
    let x = Tensor::<ADBackend, 3>::from_data(
        TensorData::new(features, [batch, 32, 4]),
        &device,
    );
    let predicted = model.predict(x);
    (
        to_host(predicted.center).unwrap(),
        to_host(predicted.width).unwrap(),
    )
}

#[test]
fn single_segment_marks_exactly_its_best_anchor() {
    let cfg = tiny_model_config();
    let device = <ADBackend as Backend>::Device::default();
    let model = TemporalDetector::<ADBackend>::new(&cfg, 4, &device).unwrap();
    let (centers, widths) = decoded(&model, vec![0.0; 32 * 4], 1);

    let gt = GroundTruthBatch {
        labels: vec![3],
        bboxes: vec![[0.2, 0.6]],
        index: vec![0, 1],
    };
    // Nothing reaches the positive threshold on its own; only the forced best match is labelled.
    let matching = MatchingConfig {
        pos_iou_threshold: 1.0,
        neg_iou_threshold: 0.3,
        force_best_match: true,
    };
    let targets = assign_targets(model.layout(), &centers, &widths, &gt, 1, &matching).unwrap();

    let ious: Vec<f32> = centers
        .iter()
        .zip(&widths)
        .map(|(x, w)| segment_iou([x - w / 2.0, x + w / 2.0], [0.2, 0.6]))
        .collect();
    let mut best = 0;
    for (a, iou) in ious.iter().enumerate() {
        if *iou > ious[best] {
            best = a;
        }
    }

    let labelled: Vec<usize> = (0..targets.anchors)
        .filter(|&a| targets.bm_labels[a] == 3)
        .collect();
    assert_eq!(labelled, vec![best]);
    assert_eq!(targets.num_positive(), 1);
    assert!(targets.positive[best]);
    assert!((targets.bm_scores[best] - ious[best]).abs() < 1e-6);
    assert!((targets.bm_x[best] - 0.4).abs() < 1e-6);
    assert!((targets.bm_w[best] - 0.4).abs() < 1e-6);
}

#[test]
fn single_segment_under_default_matching() {
    let layout = models::AnchorLayout::new(&tiny_model_config()).unwrap();
    // Zero offsets: decoded anchors are the priors. 32 steps -> levels of 4, 2 and 1 positions.
    let (centers, widths) = layout.priors();
    assert_eq!(layout.total, 7);
    let gt = GroundTruthBatch {
        labels: vec![3],
        bboxes: vec![[0.2, 0.6]],
        index: vec![0, 1],
    };
    let targets =
        assign_targets(&layout, &centers, &widths, &gt, 1, &MatchingConfig::default()).unwrap();

    let labelled: Vec<usize> = (0..targets.anchors)
        .filter(|&a| targets.bm_labels[a] == 3)
        .collect();
    // Only the AL3 prior [0.25, 0.75] clears the positive threshold (IoU 0.7).
    assert_eq!(labelled, vec![6]);
    assert_eq!(targets.num_positive(), 1);
    assert!((targets.bm_scores[6] - 0.7).abs() < 1e-5);
    // [0.125, 0.375] and [0.3125, 0.4375] fall in the ignored band.
    let ignored: Vec<usize> = (0..targets.anchors).filter(|&a| targets.ignored[a]).collect();
    assert_eq!(ignored, vec![1, 4]);
}

#[test]
fn empty_item_is_all_background() {
    let cfg = tiny_model_config();
    let device = <ADBackend as Backend>::Device::default();
    let model = TemporalDetector::<ADBackend>::new(&cfg, 4, &device).unwrap();
    let features: Vec<f32> = (0..2 * 32 * 4).map(|i| ((i * 7919) % 23) as f32 / 5.0).collect();
    let (centers, widths) = decoded(&model, features, 2);

    let gt = GroundTruthBatch::from_items(&[
        vec![],
        vec![GroundTruthSegment {
            start: 0.1,
            end: 0.9,
            label: 2,
        }],
    ]);
    assert_eq!(gt.index, vec![0, 0, 1]);
    let targets = assign_targets(
        model.layout(),
        &centers,
        &widths,
        &gt,
        2,
        &MatchingConfig::default(),
    )
    .unwrap();
    for a in targets.item_range(0) {
        assert_eq!(targets.bm_labels[a], BACKGROUND_CLASS);
        assert_eq!(targets.bm_scores[a], 0.0);
        assert!(!targets.positive[a] && !targets.ignored[a]);
    }
    assert!(targets.item_range(1).any(|a| targets.positive[a]));
}

#[test]
fn inconsistent_index_is_a_validation_error() {
    let cfg = tiny_model_config();
    let layout = models::AnchorLayout::new(&cfg).unwrap();
    let (centers, widths) = layout.priors();
    let gt = GroundTruthBatch {
        labels: vec![1],
        bboxes: vec![[0.1, 0.3]],
        index: vec![0, 2],
    };
    let err = assign_targets(&layout, &centers, &widths, &gt, 1, &MatchingConfig::default())
        .unwrap_err();
    assert_eq!(
        err,
        TargetError::InvalidGroundTruth(ValidationError::IndexEnd {
            end: 2,
            labels: 1,
            bboxes: 1
        })
    );

    let short = GroundTruthBatch {
        labels: vec![],
        bboxes: vec![],
        index: vec![0],
    };
    assert!(matches!(
        assign_targets(&layout, &centers, &widths, &short, 1, &MatchingConfig::default()),
        Err(TargetError::InvalidGroundTruth(ValidationError::IndexLength { .. }))
    ));
}

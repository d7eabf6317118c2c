use burn::backend::{ndarray::NdArray, Autodiff};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use data_contracts::config::{LevelConfig, ModelConfig};
use models::TemporalDetector;

type ADBackend = Autodiff<NdArray<f32>>;

fn tiny_config() -> ModelConfig {
    ModelConfig {
        num_classes: 5,
        input_steps: 32,
        base_channels: 8,
        anchor_channels: 12,
        levels: vec![
            LevelConfig::new("AL1", 0.125),
            LevelConfig::new("AL2", 0.25),
            LevelConfig::new("AL3", 0.5),
        ],
        ..Default::default()
    }
}

fn ramp_features(batch: usize, steps: usize, dim: usize) -> Vec<f32> {
    (0..batch * steps * dim)
        .map(|i| ((i % 17) as f32) / 17.0 - 0.5)
        .collect()
}

#[test]
fn detector_emits_one_row_per_anchor() {
    let cfg = tiny_config();
    let device = <ADBackend as Backend>::Device::default();
    let model = TemporalDetector::<ADBackend>::new(&cfg, 6, &device).unwrap();
    let layout = model.layout().clone();
    // 32 steps -> 8 after the trunk -> 4, 2, 1 positions.
    assert_eq!(layout.total, 7);

    let x = Tensor::<ADBackend, 3>::from_data(
        TensorData::new(ramp_features(3, 32, 6), [3, 32, 6]),
        &device,
    );
    let raw = model.forward(x.clone());
    assert_eq!(raw.dims(), [3, 7, 8]);

    let predicted = model.predict(x);
    assert_eq!(predicted.class_logits.dims(), [3, 7, 5]);
    assert_eq!(predicted.confidence.dims(), [3, 7]);
    let conf = predicted.confidence.into_data().to_vec::<f32>().unwrap();
    assert!(conf.iter().all(|c| *c > 0.0 && *c < 1.0));
    let widths = predicted.width.into_data().to_vec::<f32>().unwrap();
    assert!(widths.iter().all(|w| w.is_finite() && *w > 0.0));
}

#[test]
fn forward_is_deterministic_for_fixed_weights() {
    let cfg = tiny_config();
    let device = <ADBackend as Backend>::Device::default();
    let model = TemporalDetector::<ADBackend>::new(&cfg, 4, &device).unwrap();
    let x = Tensor::<ADBackend, 3>::from_data(
        TensorData::new(ramp_features(2, 32, 4), [2, 32, 4]),
        &device,
    );
    let a = model.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
    let b = model.forward(x).into_data().to_vec::<f32>().unwrap();
    assert_eq!(a, b);
}

#[test]
fn batch_items_do_not_interact() {
    let cfg = tiny_config();
    let device = <ADBackend as Backend>::Device::default();
    let model = TemporalDetector::<ADBackend>::new(&cfg, 4, &device).unwrap();
    let features = ramp_features(2, 32, 4);
    let pair = Tensor::<ADBackend, 3>::from_data(TensorData::new(features.clone(), [2, 32, 4]), &device);
    let first = Tensor::<ADBackend, 3>::from_data(
        TensorData::new(features[..32 * 4].to_vec(), [1, 32, 4]),
        &device,
    );
    let both = model.forward(pair).into_data().to_vec::<f32>().unwrap();
    let single = model.forward(first).into_data().to_vec::<f32>().unwrap();
    for (a, b) in single.iter().zip(&both[..single.len()]) {
        assert!((a - b).abs() < 1e-5);
    }
}

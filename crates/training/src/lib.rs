#![recursion_limit = "256"]

pub mod checkpoint;
pub mod dataset;
pub mod loss;
pub mod sampling;
pub mod targets;
pub mod util;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use dataset::{collate_features, collate_test, collate_train, to_host};
pub use loss::{detection_loss, smooth_l1, DetectionLoss, LossSummary};
pub use sampling::{select_anchors, AnchorSelection};
pub use targets::{assign_targets, encode_level, AnchorTargets, TargetError};
pub use util::{run_train, train_step, ADBackend, TrainReport};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

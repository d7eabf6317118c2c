//! Shared data contracts for windows, ground truth, run config, and proposals.

pub mod batch;
pub mod config;
pub mod segment;
pub mod source;

pub use batch::{GroundTruthBatch, GroundTruthSegment, TestBatch, TrainBatch, ValidationError};
pub use config::{
    ConfigError, DataConfig, DetectorConfig, LevelConfig, LossConfig, MatchingConfig,
    ModelConfig, PathsConfig, PostprocessConfig, TrainConfig,
};
pub use segment::{segment_iou, Proposal, WindowMeta};
pub use source::WindowSource;

/// Class index reserved for background anchors.
pub const BACKGROUND_CLASS: usize = 0;

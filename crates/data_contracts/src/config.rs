use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_NAME: &str = "ssad.toml";
/// Environment variable naming a config file to load when no path is given.
pub const CONFIG_ENV: &str = "SSAD_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Process-wide settings for one run. Read-only after load.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: ModelConfig,
    pub matching: MatchingConfig,
    pub loss: LossConfig,
    pub train: TrainConfig,
    pub data: DataConfig,
    pub paths: PathsConfig,
    pub postprocess: PostprocessConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of classes including background (class 0).
    pub num_classes: usize,
    /// Feature steps per window.
    pub input_steps: usize,
    /// Per-step feature width; derived from dataset/modality when unset.
    pub feature_dim: Option<usize>,
    pub base_channels: usize,
    pub anchor_channels: usize,
    /// Window length in frames; decoded boundaries are scaled by this.
    pub window_size: f32,
    /// Multiplier applied to raw regression outputs before decoding.
    pub offset_scale: f32,
    /// Pyramid levels, coarsening in order.
    pub levels: Vec<LevelConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_classes: 21,
            input_steps: 128,
            feature_dim: None,
            base_channels: 512,
            anchor_channels: 1024,
            window_size: 512.0,
            offset_scale: 0.1,
            levels: vec![
                LevelConfig::new("AL1", 0.125),
                LevelConfig::new("AL2", 0.25),
                LevelConfig::new("AL3", 0.5),
            ],
        }
    }
}

impl ModelConfig {
    pub fn frames_per_step(&self) -> f32 {
        self.window_size / self.input_steps.max(1) as f32
    }

    /// Feature width for a dataset/modality pair, unless pinned in the config.
    pub fn resolve_feature_dim(&self, dataset: &str, modality: &str) -> usize {
        if let Some(dim) = self.feature_dim {
            return dim;
        }
        if dataset == "KnetV3" || (modality == "spatial" && dataset == "Anet") {
            2048
        } else {
            1024
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LevelConfig {
    pub name: String,
    /// Prior anchor width at this level, normalized to the window.
    pub anchor_scale: f32,
}

impl LevelConfig {
    pub fn new(name: impl Into<String>, anchor_scale: f32) -> Self {
        Self {
            name: name.into(),
            anchor_scale,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Best IoU at or above this makes an anchor positive.
    pub pos_iou_threshold: f32,
    /// Best IoU below this makes an anchor plain background with zero confidence target.
    pub neg_iou_threshold: f32,
    /// Always match each ground truth to its single best anchor.
    pub force_best_match: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            pos_iou_threshold: 0.5,
            neg_iou_threshold: 0.3,
            force_best_match: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Sampled negatives per positive.
    pub negative_ratio: f32,
    /// Lower bound on sampled negatives per batch item.
    pub min_negatives: usize,
    pub p_loc: f32,
    pub p_conf: f32,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            negative_ratio: 1.0,
            min_negatives: 4,
            p_loc: 10.0,
            p_conf: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub training_epochs: usize,
    /// Learning rate per epoch; the last entry is reused past the end.
    pub learning_rates: Vec<f64>,
    /// Save a checkpoint every N epochs (0 disables; the final two epochs are always saved).
    pub checkpoint_every: usize,
    /// Checkpoints to retain (0 keeps all).
    pub keep_last: usize,
    pub seed: u64,
    /// Ignore existing checkpoints and start from fresh parameters.
    pub initialize: bool,
    pub shuffle: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let mut learning_rates = vec![1e-4; 10];
        learning_rates.extend(std::iter::repeat(1e-5).take(20));
        Self {
            batch_size: 16,
            training_epochs: 30,
            learning_rates,
            checkpoint_every: 5,
            keep_last: 2,
            seed: 42,
            initialize: false,
            shuffle: true,
        }
    }
}

impl TrainConfig {
    pub fn learning_rate(&self, epoch: usize) -> f64 {
        self.learning_rates
            .get(epoch)
            .or_else(|| self.learning_rates.last())
            .copied()
            .unwrap_or(1e-4)
    }

    pub fn should_checkpoint(&self, epoch: usize) -> bool {
        let periodic = self.checkpoint_every > 0 && (epoch + 1) % self.checkpoint_every == 0;
        periodic || epoch + 2 >= self.training_epochs
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    pub train_stride: Option<usize>,
    pub test_stride: Option<usize>,
    /// Fraction of a ground-truth segment that must fall inside a training window.
    pub min_gt_coverage: f32,
    pub keep_empty_windows: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            train_stride: None,
            test_stride: None,
            min_gt_coverage: 0.75,
            keep_empty_windows: false,
        }
    }
}

impl DataConfig {
    pub fn train_stride(&self, input_steps: usize) -> usize {
        self.train_stride.unwrap_or(input_steps / 4).max(1)
    }

    pub fn test_stride(&self, input_steps: usize) -> usize {
        self.test_stride.unwrap_or(input_steps / 2).max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub models_root: PathBuf,
    pub results_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("models"),
            results_root: PathBuf::from("results"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    pub nms_threshold: f32,
    pub min_score: f32,
    /// Proposals kept per video after NMS.
    pub max_proposals: usize,
    pub save_predict_result: bool,
    /// Checkpoint epoch restored for testing; defaults to the last training epoch.
    pub test_epoch: Option<usize>,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            nms_threshold: 0.2,
            min_score: 0.001,
            max_proposals: 200,
            save_predict_result: true,
            test_epoch: None,
        }
    }
}

impl DetectorConfig {
    /// Load from an explicit path, else `$SSAD_CONFIG`, else `ssad.toml`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(raw) = std::env::var(CONFIG_ENV) {
            if !raw.trim().is_empty() {
                return Self::from_path(&expand_path(&raw));
            }
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        tracing::info!("no config file found; using built-in defaults");
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cfg = Self::parse(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML and expand `~`/`${VAR}` in path fields. Does not validate.
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        let mut cfg: DetectorConfig = toml::from_str(raw)?;
        cfg.data.root = expand_path(&cfg.data.root.to_string_lossy());
        cfg.paths.models_root = expand_path(&cfg.paths.models_root.to_string_lossy());
        cfg.paths.results_root = expand_path(&cfg.paths.results_root.to_string_lossy());
        Ok(cfg)
    }

    pub fn test_epoch(&self) -> usize {
        self.postprocess
            .test_epoch
            .unwrap_or(self.train.training_epochs.saturating_sub(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let model = &self.model;
        if model.num_classes < 2 {
            return invalid(format!(
                "model.num_classes must include background and at least one action, got {}",
                model.num_classes
            ));
        }
        if model.input_steps == 0 {
            return invalid("model.input_steps must be positive".into());
        }
        if model.feature_dim == Some(0) || model.base_channels == 0 || model.anchor_channels == 0
        {
            return invalid("model feature/channel widths must be positive".into());
        }
        if !(model.window_size > 0.0) {
            return invalid(format!(
                "model.window_size must be positive, got {}",
                model.window_size
            ));
        }
        if !(model.offset_scale > 0.0) {
            return invalid(format!(
                "model.offset_scale must be positive, got {}",
                model.offset_scale
            ));
        }
        if model.levels.is_empty() {
            return invalid("model.levels must name at least one pyramid level".into());
        }
        for level in &model.levels {
            if !(level.anchor_scale > 0.0) || level.anchor_scale > 1.0 {
                return invalid(format!(
                    "level {} anchor_scale must be in (0, 1], got {}",
                    level.name, level.anchor_scale
                ));
            }
        }
        let m = &self.matching;
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(m.pos_iou_threshold) || !in_unit(m.neg_iou_threshold) {
            return invalid("matching thresholds must lie in [0, 1]".into());
        }
        if m.neg_iou_threshold > m.pos_iou_threshold {
            return invalid(format!(
                "matching.neg_iou_threshold {} exceeds pos_iou_threshold {}",
                m.neg_iou_threshold, m.pos_iou_threshold
            ));
        }
        let l = &self.loss;
        if l.negative_ratio < 0.0 || l.p_loc < 0.0 || l.p_conf < 0.0 {
            return invalid("loss weights and negative_ratio must be non-negative".into());
        }
        let t = &self.train;
        if t.batch_size == 0 || t.training_epochs == 0 {
            return invalid("train.batch_size and train.training_epochs must be positive".into());
        }
        if t.learning_rates.is_empty() {
            return invalid("train.learning_rates must not be empty".into());
        }
        if !in_unit(self.data.min_gt_coverage) {
            return invalid("data.min_gt_coverage must lie in [0, 1]".into());
        }
        if !in_unit(self.postprocess.nms_threshold) {
            return invalid("postprocess.nms_threshold must lie in [0, 1]".into());
        }
        Ok(())
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::new();
    let mut rest = input;
    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&format!("${{{key}}}")),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = DetectorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.model.levels.len(), 3);
        assert_eq!(cfg.train.learning_rates.len(), 30);
        assert_eq!(cfg.test_epoch(), 29);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let raw = r#"
            [model]
            num_classes = 5
            input_steps = 32

            [[model.levels]]
            name = "AL1"
            anchor_scale = 0.3

            [train]
            batch_size = 2
            learning_rates = [0.001, 0.0005]
        "#;
        let cfg = DetectorConfig::parse(raw).unwrap();
        assert_eq!(cfg.model.num_classes, 5);
        assert_eq!(cfg.model.levels, vec![LevelConfig::new("AL1", 0.3)]);
        assert_eq!(cfg.model.window_size, 512.0);
        assert_eq!(cfg.train.batch_size, 2);
        assert_eq!(cfg.train.learning_rate(1), 0.0005);
        assert_eq!(cfg.train.learning_rate(7), 0.0005);
        assert_eq!(cfg.matching.pos_iou_threshold, 0.5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.matching.neg_iou_threshold = 0.8;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_levels_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.model.levels.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn checkpoint_cadence_includes_final_two_epochs() {
        let train = TrainConfig {
            training_epochs: 7,
            checkpoint_every: 3,
            ..Default::default()
        };
        let saved: Vec<usize> = (0..7).filter(|e| train.should_checkpoint(*e)).collect();
        assert_eq!(saved, vec![2, 5, 6]);
    }

    #[test]
    fn feature_dim_follows_dataset_and_modality() {
        let model = ModelConfig::default();
        assert_eq!(model.resolve_feature_dim("KnetV3", "temporal"), 2048);
        assert_eq!(model.resolve_feature_dim("Anet", "spatial"), 2048);
        assert_eq!(model.resolve_feature_dim("Anet", "temporal"), 1024);
        assert_eq!(model.resolve_feature_dim("UCF101", "spatial"), 1024);
        let pinned = ModelConfig {
            feature_dim: Some(16),
            ..Default::default()
        };
        assert_eq!(pinned.resolve_feature_dim("KnetV3", "spatial"), 16);
    }

    #[test]
    fn env_vars_expand_in_paths() {
        std::env::set_var("SSAD_TEST_ROOT", "/tmp/ssad");
        assert_eq!(
            expand_env("${SSAD_TEST_ROOT}/models"),
            "/tmp/ssad/models".to_string()
        );
        assert_eq!(expand_env("${SSAD_UNSET_VAR_X}/a"), "${SSAD_UNSET_VAR_X}/a");
        assert_eq!(expand_env("plain/${open"), "plain/${open");
    }
}

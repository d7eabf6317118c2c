use std::fmt;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Lifecycle stage to run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Train,
    Test,
    Fuse,
    #[value(name = "train_test_fuse")]
    TrainTestFuse,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Train => "train",
            Stage::Test => "test",
            Stage::Fuse => "fuse",
            Stage::TrainTestFuse => "train_test_fuse",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature stream the windows are cut from.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Spatial,
    Temporal,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Spatial => "spatial",
            Modality::Temporal => "temporal",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ssad",
    about = "Train, test and fuse a single-shot temporal action detector"
)]
pub struct AppArgs {
    /// Stage to run.
    #[arg(value_enum)]
    pub stage: Stage,
    /// Dataset name (e.g. Thumos14, Anet, KnetV3).
    pub dataset: String,
    /// Feature stream.
    #[arg(value_enum)]
    pub modality: Modality,
    /// Method tag naming the model directory and result files.
    pub method: String,
    /// Method tag of the temporal stream (fuse only).
    pub method_temporal: Option<String>,
    /// Config file (defaults to $SSAD_CONFIG, then ./ssad.toml, then built-in defaults).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

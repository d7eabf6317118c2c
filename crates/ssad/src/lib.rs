//! Process entry for the temporal action detector: `train`, `test`, `fuse`, `train_test_fuse`.

pub mod cli;

use anyhow::Context;
use data_contracts::DetectorConfig;
use feature_dataset::ManifestSource;
use inference::{
    final_result_process, fuse_streams, read_anchor_rows, run_test, write_anchor_rows,
    write_proposals, AnchorRow,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli::{AppArgs, Modality, Stage};

/// Where a run reads and writes its artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    pub models_dir: PathBuf,
    pub predict_file: PathBuf,
    pub final_file: PathBuf,
}

impl RunPaths {
    pub fn new(config: &DetectorConfig, args: &AppArgs) -> Self {
        let modality = args.modality.as_str();
        Self {
            models_dir: config
                .paths
                .models_root
                .join(&args.method)
                .join(format!("{modality}_{}", args.dataset)),
            predict_file: predict_file(config, modality, &args.dataset, &args.method),
            final_file: config.paths.results_root.join(format!(
                "final_{}_{}_{}.csv",
                args.stage, args.dataset, args.method
            )),
        }
    }
}

pub fn predict_file(config: &DetectorConfig, modality: &str, dataset: &str, method: &str) -> PathBuf {
    config
        .paths
        .results_root
        .join(format!("predict_{modality}_{dataset}_{method}.csv"))
}

pub fn run_app(args: AppArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut config = DetectorConfig::load(args.config.as_deref())?;
    let feature_dim = config
        .model
        .resolve_feature_dim(&args.dataset, args.modality.as_str());
    config.model.feature_dim = Some(feature_dim);
    let paths = RunPaths::new(&config, &args);
    tracing::info!(
        stage = %args.stage,
        dataset = %args.dataset,
        modality = args.modality.as_str(),
        method = %args.method,
        feature_dim,
        "starting"
    );

    let result = run_stage(&config, &args, &paths);
    tracing::info!(elapsed_secs = started.elapsed().as_secs_f64(), "elapsed time");
    result
}

pub fn run_stage(config: &DetectorConfig, args: &AppArgs, paths: &RunPaths) -> anyhow::Result<()> {
    match args.stage {
        Stage::Train => train_stage(config, args, paths),
        Stage::Test => test_stage(config, args, paths),
        Stage::Fuse => fuse_stage(config, args, paths),
        Stage::TrainTestFuse => {
            train_stage(config, args, paths)?;
            test_stage(config, args, paths)
        }
    }
}

fn open_source(config: &DetectorConfig, args: &AppArgs) -> anyhow::Result<ManifestSource> {
    ManifestSource::open(config, &args.dataset, args.modality.as_str()).with_context(|| {
        format!(
            "failed to open {} {} features under {}",
            args.dataset,
            args.modality.as_str(),
            config.data.root.display()
        )
    })
}

pub fn train_stage(config: &DetectorConfig, args: &AppArgs, paths: &RunPaths) -> anyhow::Result<()> {
    let source = open_source(config, args)?;
    let report = training::run_train(config, &source, &paths.models_dir)?;
    tracing::info!(
        start_epoch = report.start_epoch,
        epochs = report.epochs_run,
        checkpoints = report.checkpoints.len(),
        "training finished"
    );
    Ok(())
}

pub fn test_stage(config: &DetectorConfig, args: &AppArgs, paths: &RunPaths) -> anyhow::Result<()> {
    let source = open_source(config, args)?;
    let rows = run_test(config, &source, &paths.models_dir, config.test_epoch())?;
    if config.postprocess.save_predict_result {
        write_anchor_rows(&paths.predict_file, &rows)?;
        tracing::info!(path = %paths.predict_file.display(), "wrote predictions");
    }
    write_final(config, &rows, &paths.final_file)
}

/// Average the spatial (`method`) and temporal (`method_temporal`) prediction tables.
pub fn fuse_stage(config: &DetectorConfig, args: &AppArgs, paths: &RunPaths) -> anyhow::Result<()> {
    let method_temporal = args
        .method_temporal
        .as_deref()
        .context("fuse needs a method_temporal argument")?;
    let spatial = predict_file(config, Modality::Spatial.as_str(), &args.dataset, &args.method);
    let temporal = predict_file(
        config,
        Modality::Temporal.as_str(),
        &args.dataset,
        method_temporal,
    );
    let tables = [read_anchor_rows(&spatial)?, read_anchor_rows(&temporal)?];
    let fused = fuse_streams(&tables)?;
    write_final(config, &fused, &paths.final_file)
}

fn write_final(config: &DetectorConfig, rows: &[AnchorRow], path: &Path) -> anyhow::Result<()> {
    let proposals = final_result_process(rows, &config.postprocess);
    write_proposals(path, &proposals)?;
    tracing::info!(
        proposals = proposals.len(),
        path = %path.display(),
        "wrote final proposals"
    );
    Ok(())
}

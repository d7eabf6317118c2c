use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use data_contracts::{DetectorConfig, TrainBatch, WindowSource};
use models::TemporalDetector;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::checkpoint::CheckpointStore;
use crate::dataset::{collate_train, to_host};
use crate::loss::{detection_loss, LossSummary};
use crate::sampling::select_anchors;
use crate::targets::assign_targets;
use crate::TrainBackend;

pub type ADBackend = Autodiff<TrainBackend>;

#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// First epoch trained in this run (after resume).
    pub start_epoch: usize,
    pub epochs_run: usize,
    /// Mean loss terms of the last epoch trained.
    pub last_loss: Option<LossSummary>,
    pub checkpoints: Vec<PathBuf>,
}

/// Train the detector on `source`, resuming from `models_dir` unless told to initialize.
pub fn run_train<S: WindowSource>(
    config: &DetectorConfig,
    source: &S,
    models_dir: &Path,
) -> anyhow::Result<TrainReport> {
    let device = <ADBackend as Backend>::Device::default();
    ADBackend::seed(config.train.seed);

    let feature_dim = config
        .model
        .feature_dim
        .context("model.feature_dim must be resolved before training")?;
    let store = CheckpointStore::new(models_dir, config.train.keep_last);
    let mut model = TemporalDetector::<ADBackend>::new(&config.model, feature_dim, &device)?;

    let resume = if config.train.initialize {
        let cleared = store.clear()?;
        if !cleared.is_empty() {
            tracing::info!(?cleared, dir = %store.dir().display(), "removed checkpoints of previous run");
        }
        None
    } else {
        store.latest_epoch()?
    };
    let start_epoch = match resume {
        Some(epoch) => {
            model = store
                .restore(model, epoch, &device)
                .with_context(|| format!("failed to resume from {}", store.dir().display()))?;
            tracing::info!(epoch, dir = %store.dir().display(), "restored checkpoint");
            epoch + 1
        }
        None => {
            tracing::info!(dir = %store.dir().display(), "no prior run; initializing parameters");
            0
        }
    };

    let batches = source
        .train_batches(config, config.train.shuffle)
        .context("failed to load training windows")?;
    if batches.is_empty() {
        anyhow::bail!("no training windows available");
    }
    tracing::info!(
        batches = batches.len(),
        anchors = model.layout().total,
        "training windows loaded"
    );

    let mut report = TrainReport {
        start_epoch,
        ..Default::default()
    };
    let mut optim = AdamConfig::new().init();
    for epoch in start_epoch..config.train.training_epochs {
        let started = Instant::now();
        let lr = config.train.learning_rate(epoch);
        let mut sum = LossSummary::default();
        for batch in &batches {
            let (next, step) = train_step(model, &mut optim, batch, config, lr, &device)?;
            model = next;
            sum.total += step.total;
            sum.class += step.class;
            sum.loc += step.loc;
            sum.conf += step.conf;
        }
        let n = batches.len() as f32;
        let mean = LossSummary {
            total: sum.total / n,
            class: sum.class / n,
            loc: sum.loc / n,
            conf: sum.conf / n,
        };
        tracing::info!(
            epoch,
            lr,
            loss = mean.total,
            class = mean.class,
            loc = mean.loc,
            conf = mean.conf,
            secs = started.elapsed().as_secs_f32(),
            "epoch finished"
        );
        report.epochs_run += 1;
        report.last_loss = Some(mean);

        if config.train.should_checkpoint(epoch) {
            let path = store.save(&model.valid(), epoch)?;
            let pruned = store.prune()?;
            if !pruned.is_empty() {
                tracing::debug!(?pruned, "pruned old checkpoints");
            }
            tracing::info!(path = %path.display(), "saved checkpoint");
            report.checkpoints.push(path);
        }
    }
    Ok(report)
}

/// One forward / match / loss / backward / Adam step.
pub fn train_step<O>(
    model: TemporalDetector<ADBackend>,
    optim: &mut O,
    batch: &TrainBatch,
    config: &DetectorConfig,
    lr: f64,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<(TemporalDetector<ADBackend>, LossSummary)>
where
    O: Optimizer<TemporalDetector<ADBackend>, ADBackend>,
{
    if batch.steps != config.model.input_steps || batch.feature_dim != model.feature_dim {
        anyhow::bail!(
            "batch windows are {}x{}, model expects {}x{}",
            batch.steps,
            batch.feature_dim,
            config.model.input_steps,
            model.feature_dim
        );
    }
    let input = collate_train::<ADBackend>(batch, device)?;
    let predictions = model.predict(input);

    let centers = to_host(predictions.center.clone().detach())?;
    let widths = to_host(predictions.width.clone().detach())?;
    let confidence = to_host(predictions.confidence.clone().detach())?;
    let targets = assign_targets(
        model.layout(),
        &centers,
        &widths,
        &batch.ground_truth,
        batch.len(),
        &config.matching,
    )?;
    let selection = select_anchors(&targets, &confidence, &config.loss);
    let loss = detection_loss(&predictions, &targets, &selection, &config.loss);
    let summary = loss.summary();

    let grads = GradientsParams::from_grads(loss.total.backward(), &model);
    let model = optim.step(lr, model, grads);
    Ok((model, summary))
}

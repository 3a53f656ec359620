use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use launchrank_core::config::TrainingSettings;
use launchrank_core::error::Error;
use launchrank_core::types::TrainingMetrics;

use crate::features::FeatureMatrix;
use crate::network::RankingModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub test_fraction: f64,
    pub seed: u64,
    #[serde(skip)]
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self { Self::from(&TrainingSettings::default()) }
}

impl From<&TrainingSettings> for TrainingConfig {
    fn from(s: &TrainingSettings) -> Self {
        Self {
            epochs: s.epochs,
            batch_size: s.batch_size,
            hidden_units: s.hidden_units,
            learning_rate: s.learning_rate,
            test_fraction: s.test_fraction,
            seed: s.seed,
            show_progress: false,
        }
    }
}

/// Outcome of a successful run. Failed runs never produce one.
#[derive(Debug)]
pub struct TrainedModel {
    pub model: RankingModel,
    pub metrics: TrainingMetrics,
    /// Mean training loss per epoch.
    pub loss_history: Vec<f32>,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Seeded shuffle then split into `(train, test)` row indices.
///
/// The test share is rounded and capped so at least one training row remains.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    let test_n = ((n as f64) * test_fraction.clamp(0.0, 1.0)).round() as usize;
    let test_n = test_n.min(n.saturating_sub(1));
    let test = idx.split_off(n - test_n);
    (idx, test)
}

pub fn mse(predictions: &[f32], targets: &[f32]) -> f32 {
    if predictions.is_empty() { return f32::NAN; }
    predictions.iter().zip(targets).map(|(p, t)| (p - t) * (p - t)).sum::<f32>() / predictions.len() as f32
}

pub fn mae(predictions: &[f32], targets: &[f32]) -> f32 {
    if predictions.is_empty() { return f32::NAN; }
    predictions.iter().zip(targets).map(|(p, t)| (p - t).abs()).sum::<f32>() / predictions.len() as f32
}

fn pick(labels: &[f32], indices: &[usize]) -> Vec<f32> { indices.iter().map(|&i| labels[i]).collect() }

fn progress_bar(epochs: usize, visible: bool) -> ProgressBar {
    if !visible { return ProgressBar::hidden(); }
    let pb = ProgressBar::new(epochs as u64);
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] epoch {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Fit a fresh model to `labels` with MSE loss and AdamW.
///
/// Errors with `EmptyDataset` when there are no rows and `TrainingDiverged`
/// on any non-finite epoch loss or final metric.
pub fn train(features: &FeatureMatrix, labels: &[f32], config: &TrainingConfig) -> Result<TrainedModel> {
    if features.is_empty() {
        return Err(Error::EmptyDataset.into());
    }
    anyhow::ensure!(labels.len() == features.rows(), "{} labels for {} feature rows", labels.len(), features.rows());
    anyhow::ensure!(config.hidden_units > 0, "hidden_units must be positive");

    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (mut train_idx, test_idx) = split_indices(features.rows(), config.test_fraction, config.seed);
    let (model, vars) = RankingModel::init(features.cols(), config.hidden_units, &mut rng, &device)?;
    let mut opt = AdamW::new(vars, ParamsAdamW { lr: config.learning_rate, ..Default::default() })?;

    tracing::info!(
        rows = features.rows(),
        train = train_idx.len(),
        test = test_idx.len(),
        input_dim = features.cols(),
        hidden = config.hidden_units,
        epochs = config.epochs,
        "training ranking model"
    );

    let batch_size = config.batch_size.max(1);
    let pb = progress_bar(config.epochs, config.show_progress);
    let mut loss_history = Vec::with_capacity(config.epochs);
    for epoch in 0..config.epochs {
        train_idx.shuffle(&mut rng);
        let mut total = 0f32;
        for batch in train_idx.chunks(batch_size) {
            let x = features.select(batch).to_tensor(&device)?;
            let y = Tensor::from_vec(pick(labels, batch), batch.len(), &device)?;
            let loss = candle_nn::loss::mse(&model.forward(&x)?, &y)?;
            opt.backward_step(&loss)?;
            total += loss.to_scalar::<f32>()? * batch.len() as f32;
        }
        let epoch_loss = total / train_idx.len() as f32;
        if !epoch_loss.is_finite() {
            pb.abandon_with_message("diverged");
            tracing::warn!(epoch, loss = epoch_loss, "training diverged");
            return Err(Error::TrainingDiverged { epoch, loss: epoch_loss }.into());
        }
        tracing::debug!(epoch, loss = epoch_loss, "epoch finished");
        loss_history.push(epoch_loss);
        pb.set_message(format!("loss {epoch_loss:.5}"));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let train_y = pick(labels, &train_idx);
    let train_pred = model.predict(&features.select(&train_idx))?;
    // A single-row dataset has no held-out rows; report training error there.
    let (test_pred, test_y) = if test_idx.is_empty() {
        tracing::warn!("no held-out rows, test metrics reuse the training rows");
        (train_pred.clone(), train_y.clone())
    } else {
        (model.predict(&features.select(&test_idx))?, pick(labels, &test_idx))
    };
    let metrics = TrainingMetrics {
        train_mse: mse(&train_pred, &train_y),
        train_mae: mae(&train_pred, &train_y),
        test_mse: mse(&test_pred, &test_y),
        test_mae: mae(&test_pred, &test_y),
    };
    if !metrics.is_finite() {
        return Err(Error::TrainingDiverged { epoch: config.epochs, loss: metrics.test_mse }.into());
    }
    tracing::info!(train_mse = metrics.train_mse, test_mse = metrics.test_mse, "training finished");

    Ok(TrainedModel { model, metrics, loss_history, train_rows: train_idx.len(), test_rows: test_idx.len() })
}

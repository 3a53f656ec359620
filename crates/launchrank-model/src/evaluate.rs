use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use launchrank_core::error::Error;
use launchrank_core::types::{Dataset, TrainingExample};

use crate::features::FeatureAssembler;
use crate::network::RankingModel;
use crate::train::{mae, mse};

/// The trivial predictor: a repeat of the previous key scores 1, anything else 0.
pub fn baseline_prediction(row: &TrainingExample) -> f32 {
    if row.key == row.previous_key { 1.0 } else { 0.0 }
}

pub fn baseline_mse(dataset: &Dataset) -> Result<f32> {
    if dataset.is_empty() {
        return Err(Error::EmptyDataset.into());
    }
    let preds: Vec<f32> = dataset.rows.iter().map(baseline_prediction).collect();
    Ok(mse(&preds, &dataset.labels()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Option<String>,
    pub rows: usize,
    pub model_mse: f32,
    pub model_mae: f32,
    pub baseline_mse: f32,
    pub beats_baseline: bool,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(run_id) = &self.run_id { writeln!(f, "run_id:        {run_id}")?; }
        writeln!(f, "rows:          {}", self.rows)?;
        writeln!(f, "model mse:     {:.6}", self.model_mse)?;
        writeln!(f, "model mae:     {:.6}", self.model_mae)?;
        writeln!(f, "baseline mse:  {:.6}", self.baseline_mse)?;
        write!(f, "beats baseline: {}", self.beats_baseline)
    }
}

/// Score `dataset` with `model` and compare against [`baseline_mse`].
pub fn evaluate(model: &RankingModel, assembler: &FeatureAssembler, dataset: &Dataset) -> Result<EvaluationReport> {
    let baseline = baseline_mse(dataset)?;
    let features = assembler.assemble_dataset(dataset)?;
    let preds = model.predict(&features)?;
    let labels = dataset.labels();
    let model_mse = mse(&preds, &labels);
    let report = EvaluationReport {
        run_id: None,
        rows: dataset.len(),
        model_mse,
        model_mae: mae(&preds, &labels),
        baseline_mse: baseline,
        beats_baseline: model_mse < baseline,
    };
    tracing::info!(model_mse = report.model_mse, baseline_mse = report.baseline_mse, "evaluation finished");
    Ok(report)
}

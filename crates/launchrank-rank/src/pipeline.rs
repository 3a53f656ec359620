//! End-to-end offline training: events -> dataset -> features -> model -> registry.
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use launchrank_core::error::Error;
use launchrank_core::traits::EventLog;
use launchrank_core::types::ModelMetadata;
use launchrank_model::{baseline_mse, evaluate, train, EvaluationReport, FeatureAssembler, TrainingConfig};
use launchrank_store::{new_run_id, DatasetBuilder, ModelRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub use_cache: bool,
    pub log_model: bool,
    pub promote: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self { Self { use_cache: true, log_model: true, promote: false } }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub metadata: ModelMetadata,
    pub baseline_mse: f32,
    pub beats_baseline: bool,
    pub loss_history: Vec<f32>,
    pub rows: usize,
    pub logged: bool,
    pub promoted: bool,
}

pub struct TrainingPipeline {
    registry: Arc<ModelRegistry>,
    builder: DatasetBuilder,
    events: Arc<dyn EventLog>,
    assembler: FeatureAssembler,
    config: TrainingConfig,
}

/// Lance stores milliseconds; keep metadata equal before and after a round trip.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

impl TrainingPipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        builder: DatasetBuilder,
        events: Arc<dyn EventLog>,
        assembler: FeatureAssembler,
        config: TrainingConfig,
    ) -> Self {
        Self { registry, builder, events, assembler, config }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the dataset, train, and optionally log and promote the model.
    ///
    /// A failed run (empty dataset, divergence) logs nothing.
    pub async fn run(&self, options: PipelineOptions) -> Result<PipelineOutcome> {
        let dataset = self.builder.build(self.events.as_ref(), options.use_cache).await?;
        if dataset.is_empty() {
            return Err(Error::EmptyDataset.into());
        }
        let features = self.assembler.assemble_dataset(&dataset)?;
        let labels = dataset.labels();
        let config = self.config.clone();
        let trained = tokio::task::spawn_blocking(move || train(&features, &labels, &config)).await??;
        let baseline = baseline_mse(&dataset)?;

        let created_at = now_millis();
        let metadata = ModelMetadata {
            run_id: new_run_id(created_at, &trained.metrics),
            embedder_id: self.assembler.embedder_id().to_string(),
            feature_dimension: trained.model.input_dim(),
            hidden_units: trained.model.hidden_units(),
            metrics: trained.metrics,
            created_at,
        };
        let beats_baseline = metadata.metrics.test_mse < baseline;
        tracing::info!(
            run_id = %metadata.run_id,
            test_mse = metadata.metrics.test_mse,
            baseline_mse = baseline,
            beats_baseline,
            "training run complete"
        );

        if options.log_model {
            self.registry.log(&trained.model, &metadata).await?;
            if options.promote {
                self.registry.promote(&metadata.run_id).await?;
            }
        }
        Ok(PipelineOutcome {
            rows: dataset.len(),
            baseline_mse: baseline,
            beats_baseline,
            loss_history: trained.loss_history,
            logged: options.log_model,
            promoted: options.log_model && options.promote,
            metadata,
        })
    }

    /// Evaluate a logged run, or the production run when `run_id` is `None`,
    /// against the current dataset.
    pub async fn evaluate(&self, run_id: Option<&str>, use_cache: bool) -> Result<EvaluationReport> {
        let loaded = match run_id {
            Some(id) => self.registry.load(id).await?,
            None => self.registry.load_latest_production().await?,
        };
        let dataset = self.builder.build(self.events.as_ref(), use_cache).await?;
        let mut report = evaluate(&loaded.model, &self.assembler, &dataset)?;
        report.run_id = Some(loaded.metadata.run_id);
        Ok(report)
    }

    pub async fn evaluate_latest(&self) -> Result<EvaluationReport> {
        self.evaluate(None, true).await
    }
}

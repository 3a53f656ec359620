//! Write-once model registry.
//!
//! Layout under the registry root:
//! - `lance/`: the `runs` table (one row per logged model) and the `meta`
//!   key/value table whose `production` key points at a `run_id`.
//! - `artifacts/<run_id>/`: `model.safetensors` and `metadata.json`.
//!
//! A run becomes visible only once its `runs` row exists, and the row is
//! appended after the artifact directory has been renamed into place.
use anyhow::{Context, Result};
use arrow_array::{Int64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use chrono::{DateTime, Utc};
use lancedb::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use launchrank_core::error::Error;
use launchrank_core::types::{ModelMetadata, TrainingMetrics};
use launchrank_model::{RankingModel, WEIGHTS_FILE};

use crate::schema::{build_runs_schema, META_TABLE, PRODUCTION_KEY, RUNS_TABLE};
use crate::table::{append_batch, column, ensure_table, get_meta, open_db, scan, set_meta, sql_literal};

pub const METADATA_FILE: &str = "metadata.json";

/// A model together with the metadata it was logged with.
#[derive(Debug)]
pub struct LoadedModel {
    pub metadata: ModelMetadata,
    pub model: RankingModel,
}

/// `<UTC yyyymmdd-HHMMSS>-<first 8 hex chars of blake3(metrics json)>`.
pub fn new_run_id(now: DateTime<Utc>, metrics: &TrainingMetrics) -> String {
    let payload = serde_json::to_vec(metrics).unwrap_or_default();
    let hash = blake3::hash(&payload).to_hex();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &hash.as_str()[..8])
}

pub fn lance_uri(root: &Path) -> String {
    root.join("lance").to_string_lossy().to_string()
}

pub struct ModelRegistry {
    root: PathBuf,
    conn: Connection,
}

impl ModelRegistry {
    pub async fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join("artifacts"))
            .await
            .with_context(|| format!("creating registry at {}", root.display()))?;
        let conn = open_db(&lance_uri(root)).await?;
        ensure_table(&conn, RUNS_TABLE, build_runs_schema()).await?;
        Ok(Self { root: root.to_path_buf(), conn })
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn connection(&self) -> &Connection { &self.conn }

    fn artifact_dir(&self, run_id: &str) -> PathBuf { self.root.join("artifacts").join(run_id) }

    /// Persist a trained model under `metadata.run_id`.
    ///
    /// Fails with `RunAlreadyLogged` if the id is taken. Nothing is visible to
    /// [`load`](Self::load) until the whole artifact is in place.
    pub async fn log(&self, model: &RankingModel, metadata: &ModelMetadata) -> Result<()> {
        let run_id = metadata.run_id.as_str();
        anyhow::ensure!(
            !run_id.is_empty() && !run_id.contains(['/', '\\']) && !run_id.starts_with('.'),
            "invalid run id '{}'",
            run_id
        );
        if self.contains(run_id).await? {
            return Err(Error::RunAlreadyLogged(run_id.to_string()).into());
        }

        let final_dir = self.artifact_dir(run_id);
        if fs::try_exists(&final_dir).await? {
            // Left behind by a run killed between rename and row append.
            tracing::warn!(run_id, "removing orphaned artifact directory");
            fs::remove_dir_all(&final_dir).await?;
        }
        let staging = self.root.join("artifacts").join(format!(".staging-{}", run_id));
        if fs::try_exists(&staging).await? {
            fs::remove_dir_all(&staging).await?;
        }
        fs::create_dir_all(&staging).await?;
        model.save(&staging.join(WEIGHTS_FILE))?;
        fs::write(staging.join(METADATA_FILE), serde_json::to_vec_pretty(metadata)?).await?;
        fs::rename(&staging, &final_dir).await?;

        let artifact_path = Path::new("artifacts").join(run_id).to_string_lossy().to_string();
        if let Err(e) = append_batch(&self.conn, RUNS_TABLE, run_batch(metadata, &artifact_path)?).await {
            let _ = fs::remove_dir_all(&final_dir).await;
            return Err(e.context(format!("recording run {}", run_id)));
        }
        tracing::info!(run_id, test_mse = metadata.metrics.test_mse, "logged model");
        Ok(())
    }

    pub async fn contains(&self, run_id: &str) -> Result<bool> {
        Ok(!self.runs_matching(Some(run_id)).await?.is_empty())
    }

    pub async fn metadata(&self, run_id: &str) -> Result<ModelMetadata> {
        self.runs_matching(Some(run_id))
            .await?
            .into_iter()
            .next()
            .map(|(m, _)| m)
            .ok_or_else(|| Error::ModelNotFound(run_id.to_string()).into())
    }

    pub async fn load(&self, run_id: &str) -> Result<LoadedModel> {
        let (metadata, artifact_path) = self
            .runs_matching(Some(run_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModelNotFound(run_id.to_string()))?;
        let weights = self.root.join(artifact_path).join(WEIGHTS_FILE);
        let model = RankingModel::load(&weights, metadata.feature_dimension, metadata.hidden_units)
            .with_context(|| format!("loading weights for run {}", run_id))?;
        tracing::info!(run_id, "loaded model");
        Ok(LoadedModel { metadata, model })
    }

    /// Point `production` at an already logged run.
    pub async fn promote(&self, run_id: &str) -> Result<()> {
        if !self.contains(run_id).await? {
            return Err(Error::ModelNotFound(run_id.to_string()).into());
        }
        set_meta(&self.conn, META_TABLE, PRODUCTION_KEY, run_id).await?;
        tracing::info!(run_id, "promoted model to production");
        Ok(())
    }

    pub async fn production_run_id(&self) -> Result<Option<String>> {
        get_meta(&self.conn, META_TABLE, PRODUCTION_KEY).await
    }

    pub async fn load_latest_production(&self) -> Result<LoadedModel> {
        let run_id = self.production_run_id().await?.ok_or(Error::NoProductionModel)?;
        self.load(&run_id).await
    }

    /// All logged runs, oldest first.
    pub async fn list_runs(&self) -> Result<Vec<ModelMetadata>> {
        let mut runs: Vec<ModelMetadata> = self.runs_matching(None).await?.into_iter().map(|(m, _)| m).collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }

    async fn runs_matching(&self, run_id: Option<&str>) -> Result<Vec<(ModelMetadata, String)>> {
        let filter = run_id.map(|id| format!("run_id = {}", sql_literal(id)));
        let mut out = Vec::new();
        for batch in scan(&self.conn, RUNS_TABLE, filter.as_deref()).await? {
            out.extend(batch_to_runs(&batch)?);
        }
        Ok(out)
    }
}

fn run_batch(m: &ModelMetadata, artifact_path: &str) -> Result<RecordBatch> {
    Ok(RecordBatch::try_new(
        build_runs_schema(),
        vec![
            Arc::new(StringArray::from(vec![m.run_id.clone()])),
            Arc::new(StringArray::from(vec![m.embedder_id.clone()])),
            Arc::new(Int64Array::from(vec![m.feature_dimension as i64])),
            Arc::new(Int64Array::from(vec![m.hidden_units as i64])),
            Arc::new(StringArray::from(vec![serde_json::to_string(&m.metrics)?])),
            Arc::new(TimestampMillisecondArray::from(vec![m.created_at.timestamp_millis()])),
            Arc::new(StringArray::from(vec![artifact_path.to_string()])),
        ],
    )?)
}

fn batch_to_runs(batch: &RecordBatch) -> Result<Vec<(ModelMetadata, String)>> {
    let run_id = column::<StringArray>(batch, "run_id")?;
    let embedder_id = column::<StringArray>(batch, "embedder_id")?;
    let feature_dimension = column::<Int64Array>(batch, "feature_dimension")?;
    let hidden_units = column::<Int64Array>(batch, "hidden_units")?;
    let metrics = column::<StringArray>(batch, "metrics_json")?;
    let created_at = column::<TimestampMillisecondArray>(batch, "created_at")?;
    let artifact_path = column::<StringArray>(batch, "artifact_path")?;

    (0..batch.num_rows())
        .map(|i| {
            let metadata = ModelMetadata {
                run_id: run_id.value(i).to_string(),
                embedder_id: embedder_id.value(i).to_string(),
                feature_dimension: feature_dimension.value(i) as usize,
                hidden_units: hidden_units.value(i) as usize,
                metrics: serde_json::from_str(metrics.value(i))?,
                created_at: DateTime::from_timestamp_millis(created_at.value(i)).unwrap_or_default(),
            };
            Ok((metadata, artifact_path.value(i).to_string()))
        })
        .collect()
}

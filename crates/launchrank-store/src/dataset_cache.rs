//! Materialised training dataset, stored next to the runs it trains.
use anyhow::Result;
use arrow_array::{Float32Array, Int64Array, RecordBatch, StringArray};
use lancedb::Connection;
use std::sync::Arc;

use launchrank_core::traits::EventLog;
use launchrank_core::types::{Dataset, TrainingExample};
use launchrank_model::{aggregate_events, LabelPolicy};

use crate::schema::{build_training_examples_schema, TRAINING_EXAMPLES_TABLE};
use crate::table::{append_batch, column, ensure_table, scan, table_exists};

pub struct DatasetBuilder {
    conn: Connection,
    policy: LabelPolicy,
}

impl DatasetBuilder {
    pub fn new(conn: Connection, policy: LabelPolicy) -> Self { Self { conn, policy } }

    pub fn policy(&self) -> &LabelPolicy { &self.policy }

    /// With `use_cache`, return the stored dataset verbatim when one exists.
    /// Otherwise aggregate the log and overwrite the stored copy.
    pub async fn build<L: EventLog + ?Sized>(&self, log: &L, use_cache: bool) -> Result<Dataset> {
        if use_cache {
            if let Some(cached) = self.cached().await? {
                tracing::info!(rows = cached.len(), "using cached training dataset");
                return Ok(cached);
            }
        }
        let events = log.events()?;
        let dataset = aggregate_events(&events, &self.policy);
        self.store(&dataset).await?;
        Ok(dataset)
    }

    pub async fn cached(&self) -> Result<Option<Dataset>> {
        let mut rows = Vec::new();
        for batch in scan(&self.conn, TRAINING_EXAMPLES_TABLE, None).await? {
            rows.extend(batch_to_examples(&batch)?);
        }
        if rows.is_empty() { return Ok(None); }
        rows.sort_by(|a, b| (&a.key, &a.previous_key).cmp(&(&b.key, &b.previous_key)));
        Ok(Some(Dataset { rows }))
    }

    /// Replace the stored dataset with `dataset`.
    pub async fn store(&self, dataset: &Dataset) -> Result<()> {
        if table_exists(&self.conn, TRAINING_EXAMPLES_TABLE).await? {
            let t = self.conn.open_table(TRAINING_EXAMPLES_TABLE).execute().await?;
            t.delete("true").await?;
        } else {
            ensure_table(&self.conn, TRAINING_EXAMPLES_TABLE, build_training_examples_schema()).await?;
        }
        if dataset.is_empty() { return Ok(()); }
        append_batch(&self.conn, TRAINING_EXAMPLES_TABLE, examples_batch(dataset)?).await?;
        tracing::debug!(rows = dataset.len(), "stored training dataset");
        Ok(())
    }
}

fn examples_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let rows = &dataset.rows;
    Ok(RecordBatch::try_new(
        build_training_examples_schema(),
        vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.key.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.previous_key.clone()).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(rows.iter().map(|r| i64::from(r.count)).collect::<Vec<_>>())),
            Arc::new(Float32Array::from(rows.iter().map(|r| r.label).collect::<Vec<_>>())),
        ],
    )?)
}

fn batch_to_examples(batch: &RecordBatch) -> Result<Vec<TrainingExample>> {
    let key = column::<StringArray>(batch, "key")?;
    let previous_key = column::<StringArray>(batch, "previous_key")?;
    let count = column::<Int64Array>(batch, "count")?;
    let label = column::<Float32Array>(batch, "label")?;
    Ok((0..batch.num_rows())
        .map(|i| TrainingExample {
            key: key.value(i).to_string(),
            previous_key: previous_key.value(i).to_string(),
            count: u32::try_from(count.value(i)).unwrap_or(u32::MAX),
            label: label.value(i),
        })
        .collect())
}

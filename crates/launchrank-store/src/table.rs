//! LanceDB connection and housekeeping helpers.
use anyhow::{anyhow, Result};
use arrow_array::{Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use crate::schema::build_meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Append one batch, creating the table on first write.
pub async fn append_batch(conn: &Connection, name: &str, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    if table_exists(conn, name).await? {
        conn.open_table(name).execute().await?.add(reader).execute().await?;
    } else {
        conn.create_table(name, reader).execute().await?;
    }
    Ok(())
}

/// Every batch of `name`, optionally filtered. A missing table reads as empty.
pub async fn scan(conn: &Connection, name: &str, filter: Option<&str>) -> Result<Vec<RecordBatch>> {
    if !table_exists(conn, name).await? {
        return Ok(Vec::new());
    }
    let t = conn.open_table(name).execute().await?;
    let query = match filter {
        Some(f) => t.query().only_if(f),
        None => t.query(),
    };
    let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;
    Ok(batches.into_iter().filter(|b| b.num_rows() > 0).collect())
}

/// Quote a string literal for a Lance SQL filter.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{}' missing or of unexpected type", name))
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
    ensure_table(conn, name, build_meta_schema()).await
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_meta_table(conn, table).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // Upsert behavior via merge_insert: key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    let filter = format!("key = {}", sql_literal(key));
    match scan(conn, table, Some(&filter)).await?.first() {
        Some(batch) => Ok(Some(column::<StringArray>(batch, "value")?.value(0).to_string())),
        None => Ok(None),
    }
}

//! Arrow schemas for the registry database.
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const RUNS_TABLE: &str = "runs";
pub const META_TABLE: &str = "meta";
pub const TRAINING_EXAMPLES_TABLE: &str = "training_examples";

/// Key in the meta table holding the production `run_id`.
pub const PRODUCTION_KEY: &str = "production";

pub fn build_runs_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("embedder_id", DataType::Utf8, false),
        Field::new("feature_dimension", DataType::Int64, false),
        Field::new("hidden_units", DataType::Int64, false),
        Field::new("metrics_json", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("artifact_path", DataType::Utf8, false),
    ]))
}

pub fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

pub fn build_training_examples_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("previous_key", DataType::Utf8, false),
        Field::new("count", DataType::Int64, false),
        Field::new("label", DataType::Float32, false),
    ]))
}

//! Serving and orchestration on top of the model and registry crates.
pub mod generator;
pub mod pipeline;
pub mod service;

pub use generator::{order_by_score, RankingGenerator};
pub use pipeline::{PipelineOptions, PipelineOutcome, TrainingPipeline};
pub use service::{HealthReport, RankingService, RankingSnapshot};

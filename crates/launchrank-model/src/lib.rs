//! Learning side of the ranker: event aggregation, feature assembly, the
//! feed-forward regressor and its evaluation against a trivial baseline.
pub mod dataset;
pub mod evaluate;
pub mod features;
pub mod network;
pub mod train;

pub use dataset::{aggregate_events, LabelPolicy};
pub use evaluate::{baseline_mse, evaluate, EvaluationReport};
pub use features::{FeatureAssembler, FeatureMatrix};
pub use network::{RankingModel, WEIGHTS_FILE};
pub use train::{train, TrainedModel, TrainingConfig};

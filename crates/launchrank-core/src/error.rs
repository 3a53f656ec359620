use thiserror::Error;

/// Named failures surfaced to callers of `generate`/`reload`/`train`.
///
/// Library code returns `anyhow::Result` with one of these as the root cause;
/// the HTTP and CLI layers recover it with `downcast_ref::<Error>()`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration unavailable: {0}")]
    ConfigurationUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate entry key '{key}' (already defined in {first})")]
    DuplicateKey { key: String, first: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No production model has been promoted")]
    NoProductionModel,

    #[error("Run '{0}' has already been logged")]
    RunAlreadyLogged(String),

    #[error("Dataset is empty (no transitions with a previous key)")]
    EmptyDataset,

    #[error("Training diverged at epoch {epoch}: loss={loss}")]
    TrainingDiverged { epoch: usize, loss: f32 },

    #[error("Feature dimension mismatch: model expects {expected}, embedder produces {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Refusing to store empty content")]
    EmptyContent,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Short machine-readable code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationUnavailable(_) => "configuration_unavailable",
            Self::InvalidConfig(_) => "invalid_config",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::ModelNotFound(_) => "model_not_found",
            Self::NoProductionModel => "no_production_model",
            Self::RunAlreadyLogged(_) => "run_already_logged",
            Self::EmptyDataset => "empty_dataset",
            Self::TrainingDiverged { .. } => "training_diverged",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::EmptyContent => "empty_content",
            Self::NotFound(_) => "not_found",
            Self::Operation(_) => "operation_failed",
        }
    }

    /// Availability failures: the resource may come back, the request was fine.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationUnavailable(_) | Self::ModelNotFound(_) | Self::NoProductionModel
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

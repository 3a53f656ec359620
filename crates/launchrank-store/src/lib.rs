//! Lance-backed persistence: the model registry and the materialised
//! training dataset share one database under the registry directory.
pub mod dataset_cache;
pub mod registry;
pub mod schema;
pub mod table;

pub use dataset_cache::DatasetBuilder;
pub use registry::{lance_uri, new_run_id, LoadedModel, ModelRegistry};

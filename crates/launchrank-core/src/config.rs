//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_TRAINING__EPOCHS`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_for_env(None)
    }

    /// Load using an explicit environment name instead of `RUST_ENV`.
    pub fn load_for_env(env_override: Option<&str>) -> anyhow::Result<Self> {
        let env_name = match env_override {
            Some(name) => name.to_string(),
            None => env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string()),
        };

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    /// Defaults only; no files or environment. Used by tests and tooling.
    pub fn with_defaults() -> Self {
        Self {
            figment: Figment::new().merge(Serialized::defaults(Settings::default())),
            env_name: "test".to_string(),
        }
    }

    /// Layer an arbitrary provider (e.g. CLI overrides) on top.
    pub fn merge<T: figment::Provider>(self, provider: T) -> Self {
        Self { figment: self.figment.merge(provider), env_name: self.env_name }
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The whole typed settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if settings.embedding.dim == 0 {
            return Err(crate::error::Error::InvalidConfig("embedding.dim must be > 0".into()).into());
        }
        if !(0.0..1.0).contains(&settings.training.test_fraction) {
            return Err(crate::error::Error::InvalidConfig(format!(
                "training.test_fraction must be in [0, 1), got {}",
                settings.training.test_fraction
            ))
            .into());
        }
        let is_prod = matches!(self.env_name.as_str(), "prod" | "production");
        if is_prod && settings.embedding.backend == EmbeddingBackend::Hashed {
            tracing::warn!("production environment is using the hashed embedder");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub training: TrainingSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub entries_dir: String,
    pub events_dir: String,
    pub registry_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            entries_dir: "~/.launchrank/entries".to_string(),
            events_dir: "~/.launchrank/events".to_string(),
            registry_dir: "~/.launchrank/registry".to_string(),
        }
    }
}

impl DataSettings {
    pub fn entries_dir(&self) -> PathBuf { expand_path(&self.entries_dir) }
    pub fn events_dir(&self) -> PathBuf { expand_path(&self.events_dir) }
    pub fn registry_dir(&self) -> PathBuf { expand_path(&self.registry_dir) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Hashed,
    Bert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub dim: usize,
    pub model_dir: Option<String>,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Hashed, dim: 384, model_dir: None, max_len: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub half_life_days: Option<f64>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            hidden_units: 32,
            learning_rate: 1e-3,
            test_fraction: 0.2,
            seed: 42,
            half_life_days: Some(90.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub latest_used: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8000".to_string(), latest_used: 10 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_figment() {
        let settings = Config::with_defaults().settings().expect("settings");
        assert_eq!(settings.embedding.dim, 384);
        assert_eq!(settings.embedding.backend, EmbeddingBackend::Hashed);
        assert_eq!(settings.training.epochs, 20);
        assert_eq!(settings.training.seed, 42);
        assert_eq!(settings.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn nested_key_lookup() {
        let config = Config::with_defaults();
        let batch: usize = config.get("training.batch_size").expect("batch size");
        assert_eq!(batch, 32);
        assert!(config.get::<usize>("training.nope").is_err());
    }

    #[test]
    fn provider_overrides_win() {
        let config = Config::with_defaults()
            .merge(Serialized::default("embedding.dim", 16usize));
        assert_eq!(config.settings().unwrap().embedding.dim, 16);
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/launchrank");
        assert_eq!(resolve_with_base(base, "entries"), PathBuf::from("/srv/launchrank/entries"));
        assert_eq!(resolve_with_base(base, "/abs/x"), PathBuf::from("/abs/x"));
    }
}

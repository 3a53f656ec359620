//! Wiring from `Settings` to the library components.
use anyhow::Result;
use std::sync::Arc;

use launchrank_core::config::{Config, Settings};
use launchrank_core::entries::TomlEntryStore;
use launchrank_core::events::{JsonlEventLog, JsonlEventSink, RunRecorder};
use launchrank_embed::get_default_embedder;
use launchrank_model::{FeatureAssembler, LabelPolicy, TrainingConfig};
use launchrank_rank::{RankingService, TrainingPipeline};
use launchrank_store::{DatasetBuilder, ModelRegistry};

pub struct App {
    pub settings: Settings,
}

impl App {
    pub fn new(settings: Settings) -> Self { Self { settings } }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.settings()?))
    }

    pub fn entry_store(&self) -> TomlEntryStore {
        TomlEntryStore::new(self.settings.data.entries_dir())
    }

    pub fn event_log(&self) -> JsonlEventLog {
        JsonlEventLog::in_dir(&self.settings.data.events_dir())
    }

    pub fn event_sink(&self) -> JsonlEventSink {
        JsonlEventSink::new(self.settings.data.events_dir())
    }

    pub fn recorder(&self) -> RunRecorder<JsonlEventLog, JsonlEventSink> {
        RunRecorder::in_dir(&self.settings.data.events_dir())
    }

    pub async fn registry(&self) -> Result<Arc<ModelRegistry>> {
        Ok(Arc::new(ModelRegistry::open(&self.settings.data.registry_dir()).await?))
    }

    pub fn assembler(&self) -> Result<FeatureAssembler> {
        Ok(FeatureAssembler::new(get_default_embedder(&self.settings.embedding)?))
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig::from(&self.settings.training)
    }

    pub async fn pipeline(&self) -> Result<TrainingPipeline> {
        let registry = self.registry().await?;
        let builder = DatasetBuilder::new(registry.connection().clone(), LabelPolicy::from(&self.settings.training));
        Ok(TrainingPipeline::new(
            registry,
            builder,
            Arc::new(self.event_log()),
            self.assembler()?,
            self.training_config(),
        ))
    }

    pub async fn ranking_service(&self) -> Result<RankingService> {
        RankingService::start(
            Arc::new(self.entry_store()),
            Arc::new(self.event_log()),
            self.registry().await?,
            self.assembler()?,
            self.settings.server.latest_used,
        )
        .await
    }
}

/// Positional arguments of `capture`, checked against `--anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    Named { key: String, content: Option<String> },
    Anonymous { content: Option<String> },
}

impl CaptureTarget {
    pub fn from_args(anonymous: bool, args: Vec<String>) -> Result<Self> {
        let mut args = args.into_iter();
        if anonymous {
            let content = args.next();
            anyhow::ensure!(args.next().is_none(), "--anonymous takes at most one argument, the content");
            return Ok(Self::Anonymous { content });
        }
        let key = args.next().ok_or_else(|| anyhow::anyhow!("capture needs a key (or --anonymous)"))?;
        let content = args.next();
        anyhow::ensure!(args.next().is_none(), "capture takes a key and at most one content argument");
        Ok(Self::Named { key, content })
    }
}

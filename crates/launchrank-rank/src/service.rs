//! Serving state: one immutable snapshot behind a swap-on-reload cell.
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use launchrank_core::traits::{EntryProvider, EventLog};
use launchrank_core::types::{EntryCatalog, RankingResult};
use launchrank_model::FeatureAssembler;
use launchrank_store::ModelRegistry;

use crate::generator::RankingGenerator;

/// Everything a request reads, built together and never mutated.
#[derive(Debug)]
pub struct RankingSnapshot {
    pub catalog: EntryCatalog,
    pub context: Option<String>,
    pub generator: RankingGenerator,
    pub ranking: RankingResult,
    pub built_at: DateTime<Utc>,
}

impl RankingSnapshot {
    pub fn run_id(&self) -> &str { self.generator.run_id() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub keys_count: usize,
    pub run_id: String,
    pub latest_used_entries: Vec<String>,
}

pub struct RankingService {
    entries: Arc<dyn EntryProvider>,
    events: Arc<dyn EventLog>,
    registry: Arc<ModelRegistry>,
    assembler: FeatureAssembler,
    latest_used: usize,
    current: RwLock<Arc<RankingSnapshot>>,
    reload_gate: Mutex<()>,
}

impl std::fmt::Debug for RankingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingService").field("registry", &self.registry.root()).finish_non_exhaustive()
    }
}

impl RankingService {
    /// Build the first snapshot. Fails if entries or the production model
    /// cannot be loaded; there is nothing to serve without them.
    pub async fn start(
        entries: Arc<dyn EntryProvider>,
        events: Arc<dyn EventLog>,
        registry: Arc<ModelRegistry>,
        assembler: FeatureAssembler,
        latest_used: usize,
    ) -> Result<Self> {
        let snapshot = build_snapshot(CatalogRead::Cached, &entries, &events, &registry, &assembler).await?;
        tracing::info!(keys = snapshot.catalog.len(), run_id = snapshot.run_id(), "ranking service started");
        Ok(Self {
            entries,
            events,
            registry,
            assembler,
            latest_used,
            current: RwLock::new(Arc::new(snapshot)),
            reload_gate: Mutex::new(()),
        })
    }

    /// The snapshot in effect right now. Holders keep it alive across reloads.
    pub async fn current(&self) -> Arc<RankingSnapshot> {
        self.current.read().await.clone()
    }

    /// Re-read entries, re-resolve the production model and swap in a new
    /// snapshot. On failure the previous snapshot keeps serving.
    pub async fn reload(&self) -> Result<Arc<RankingSnapshot>> {
        let _gate = self.reload_gate.lock().await;
        let built = build_snapshot(CatalogRead::Fresh, &self.entries, &self.events, &self.registry, &self.assembler).await;
        match built {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.current.write().await = snapshot.clone();
                tracing::info!(keys = snapshot.catalog.len(), run_id = snapshot.run_id(), "reloaded ranking");
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reload failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    pub async fn generate_text(&self) -> String {
        self.current().await.ranking.to_text()
    }

    pub async fn reload_and_generate(&self) -> Result<String> {
        Ok(self.reload().await?.ranking.to_text())
    }

    /// Rank the current catalog for an explicit context with the current model.
    pub async fn rank_for(&self, context: Option<&str>) -> Result<RankingResult> {
        let snapshot = self.current().await;
        let context = context.map(str::to_string);
        tokio::task::spawn_blocking(move || snapshot.generator.generate(context.as_deref(), &snapshot.catalog.keys()))
            .await?
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let snapshot = self.current().await;
        Ok(HealthReport {
            keys_count: snapshot.catalog.len(),
            run_id: snapshot.run_id().to_string(),
            latest_used_entries: self.events.latest_used_keys(self.latest_used)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum CatalogRead {
    Cached,
    Fresh,
}

/// Entry files are read and every key embedded off the async workers; only
/// the registry lookup runs on them.
async fn build_snapshot(
    read: CatalogRead,
    entries: &Arc<dyn EntryProvider>,
    events: &Arc<dyn EventLog>,
    registry: &ModelRegistry,
    assembler: &FeatureAssembler,
) -> Result<RankingSnapshot> {
    let entries = entries.clone();
    let catalog = tokio::task::spawn_blocking(move || match read {
        CatalogRead::Cached => entries.load_config(),
        CatalogRead::Fresh => entries.reload(),
    })
    .await??;
    let loaded = registry.load_latest_production().await?;
    let events = events.clone();
    let assembler = assembler.clone();
    tokio::task::spawn_blocking(move || -> Result<RankingSnapshot> {
        let generator = RankingGenerator::new(loaded, assembler)?;
        let context = match events.latest_used_keys(1) {
            Ok(keys) => keys.into_iter().next(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read usage history, ranking without context");
                None
            }
        };
        let ranking = generator.generate(context.as_deref(), &catalog.keys())?;
        Ok(RankingSnapshot { catalog, context, generator, ranking, built_at: Utc::now() })
    })
    .await?
}

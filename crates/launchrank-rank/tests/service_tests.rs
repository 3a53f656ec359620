use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use launchrank_core::entries::TomlEntryStore;
use launchrank_core::error::Error;
use launchrank_core::events::{JsonlEventLog, RunRecorder};
use launchrank_core::traits::EventLog;
use launchrank_embed::HashedEmbedder;
use launchrank_model::{FeatureAssembler, LabelPolicy, TrainingConfig};
use launchrank_rank::{PipelineOptions, RankingService, TrainingPipeline};
use launchrank_store::{DatasetBuilder, ModelRegistry};

const BASE_ENTRIES: &str = r#"
[ls]
cmd = "ls -la"

[pwd]
cmd = "pwd"

["git status"]
cmd = "git status"

["open github"]
url = "https://github.com"
"#;

struct Fixture {
    _tmp: TempDir,
    entries_dir: PathBuf,
    events: Arc<JsonlEventLog>,
    registry: Arc<ModelRegistry>,
    assembler: FeatureAssembler,
}

impl Fixture {
    fn pipeline(&self) -> TrainingPipeline {
        let builder = DatasetBuilder::new(self.registry.connection().clone(), LabelPolicy::counts());
        let config = TrainingConfig { epochs: 10, batch_size: 4, hidden_units: 8, learning_rate: 1e-2, ..Default::default() };
        TrainingPipeline::new(self.registry.clone(), builder, self.events.clone(), self.assembler.clone(), config)
    }

    async fn service(&self) -> anyhow::Result<RankingService> {
        RankingService::start(
            Arc::new(TomlEntryStore::new(&self.entries_dir)),
            self.events.clone(),
            self.registry.clone(),
            self.assembler.clone(),
            10,
        )
        .await
    }
}

fn record_usage(events_dir: &Path, keys: &[&str]) {
    let recorder = RunRecorder::in_dir(events_dir);
    let t0 = Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap();
    for (i, key) in keys.iter().enumerate() {
        recorder.record(key, t0 + Duration::seconds(i as i64)).unwrap();
    }
}

async fn fixture(usage: &[&str]) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let entries_dir = tmp.path().join("entries");
    let events_dir = tmp.path().join("events");
    std::fs::create_dir_all(&entries_dir).unwrap();
    std::fs::write(entries_dir.join("base.toml"), BASE_ENTRIES).unwrap();
    record_usage(&events_dir, usage);
    let registry = Arc::new(ModelRegistry::open(&tmp.path().join("registry")).await.unwrap());
    Fixture {
        events: Arc::new(JsonlEventLog::in_dir(&events_dir)),
        _tmp: tmp,
        entries_dir,
        registry,
        assembler: FeatureAssembler::new(Arc::new(HashedEmbedder::new(8))),
    }
}

const USAGE: &[&str] = &["ls", "pwd", "ls", "git status", "ls", "pwd", "open github", "ls", "git status"];

async fn trained_fixture() -> Fixture {
    let f = fixture(USAGE).await;
    f.pipeline().run(PipelineOptions { promote: true, ..Default::default() }).await.unwrap();
    f
}

fn key_set<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    keys.map(str::to_string).collect()
}

#[tokio::test]
async fn pipeline_logs_promotes_and_evaluates() -> anyhow::Result<()> {
    let f = fixture(USAGE).await;
    let outcome = f.pipeline().run(PipelineOptions { promote: true, ..Default::default() }).await?;

    assert!(outcome.logged && outcome.promoted);
    assert!(outcome.metadata.metrics.is_finite());
    assert!(outcome.baseline_mse.is_finite());
    assert_eq!(outcome.metadata.feature_dimension, 16);
    assert_eq!(f.registry.production_run_id().await?.as_deref(), Some(outcome.metadata.run_id.as_str()));
    assert_eq!(f.registry.metadata(&outcome.metadata.run_id).await?, outcome.metadata);

    let report = f.pipeline().evaluate_latest().await?;
    assert_eq!(report.run_id.as_deref(), Some(outcome.metadata.run_id.as_str()));
    assert_eq!(report.rows, outcome.rows);
    assert!(report.model_mse.is_finite());
    Ok(())
}

#[tokio::test]
async fn unlogged_run_leaves_registry_untouched() -> anyhow::Result<()> {
    let f = fixture(USAGE).await;
    let outcome = f.pipeline().run(PipelineOptions { log_model: false, promote: true, ..Default::default() }).await?;
    assert!(!outcome.logged && !outcome.promoted);
    assert!(f.registry.list_runs().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn training_without_transitions_fails_and_logs_nothing() -> anyhow::Result<()> {
    let f = fixture(&["ls"]).await;
    let err = f.pipeline().run(PipelineOptions::default()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmptyDataset)));
    assert!(f.registry.list_runs().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn diverged_training_logs_nothing() -> anyhow::Result<()> {
    let f = fixture(USAGE).await;
    let config = TrainingConfig { epochs: 3, batch_size: 1, hidden_units: 8, learning_rate: f64::INFINITY, ..Default::default() };
    let err = f.pipeline().with_config(config).run(PipelineOptions { promote: true, ..Default::default() }).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::TrainingDiverged { .. })));
    assert!(f.registry.list_runs().await?.is_empty());
    assert_eq!(f.registry.production_run_id().await?, None);
    Ok(())
}

#[tokio::test]
async fn service_requires_a_production_model() {
    let f = fixture(USAGE).await;
    let err = f.service().await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoProductionModel)));
}

#[tokio::test]
async fn ranking_is_total_ordered_and_deterministic() -> anyhow::Result<()> {
    let f = trained_fixture().await;
    let service = f.service().await?;
    let snapshot = service.current().await;

    let ranking = &snapshot.ranking;
    assert_eq!(ranking.len(), snapshot.catalog.len());
    assert_eq!(key_set(ranking.keys()), key_set(snapshot.catalog.keys().iter().map(String::as_str)));
    assert!(ranking.entries.windows(2).all(|w| w[0].score >= w[1].score));

    assert_eq!(service.generate_text().await, service.generate_text().await);
    let keys = snapshot.catalog.keys();
    let a = snapshot.generator.generate(Some("ls"), &keys)?;
    let b = snapshot.generator.generate(Some("ls"), &keys)?;
    assert_eq!(a, b);
    assert_eq!(service.generate_text().await, ranking.to_text());
    Ok(())
}

#[tokio::test]
async fn empty_candidates_and_unknown_context_are_not_errors() -> anyhow::Result<()> {
    let f = trained_fixture().await;
    let service = f.service().await?;
    let snapshot = service.current().await;

    assert!(snapshot.generator.generate(None, &[]).unwrap().is_empty());
    let unknown = service.rank_for(Some("never-used-before")).await?;
    assert_eq!(unknown.len(), snapshot.catalog.len());
    Ok(())
}

#[tokio::test]
async fn context_and_health_come_from_usage_history() -> anyhow::Result<()> {
    let f = trained_fixture().await;
    let service = f.service().await?;
    let snapshot = service.current().await;
    assert_eq!(snapshot.context.as_deref(), Some("git status"));

    let health = service.health().await?;
    assert_eq!(health.keys_count, 4);
    assert_eq!(health.run_id, snapshot.run_id());
    assert_eq!(health.latest_used_entries, vec!["git status", "ls", "open github", "pwd"]);
    assert_eq!(health.latest_used_entries, f.events.latest_used_keys(10)?);
    Ok(())
}

#[tokio::test]
async fn reload_picks_up_new_entries() -> anyhow::Result<()> {
    let f = trained_fixture().await;
    let service = f.service().await?;
    let before = service.current().await;

    std::fs::write(f.entries_dir.join("extra.toml"), "[htop]\ncmd = \"htop\"\n")?;
    let text = service.reload_and_generate().await?;

    let after = service.current().await;
    assert_eq!(after.catalog.len(), before.catalog.len() + 1);
    assert!(text.lines().any(|l| l == "htop"));
    assert_eq!(text.lines().count(), 5);
    assert_eq!(before.catalog.len(), 4, "old snapshot is untouched");
    Ok(())
}

#[tokio::test]
async fn failed_reload_keeps_previous_snapshot() -> anyhow::Result<()> {
    let f = trained_fixture().await;
    let service = f.service().await?;
    let before = service.current().await;

    std::fs::write(f.entries_dir.join("dup.toml"), "[ls]\ncmd = \"ls -1\"\n")?;
    let err = service.reload().await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateKey { .. })));
    assert!(Arc::ptr_eq(&before, &service.current().await));
    assert_eq!(service.generate_text().await, before.ranking.to_text());

    std::fs::remove_file(f.entries_dir.join("dup.toml"))?;
    service.reload().await?;
    assert!(!Arc::ptr_eq(&before, &service.current().await));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_a_mixed_snapshot() -> anyhow::Result<()> {
    let f = trained_fixture().await;
    let service = Arc::new(f.service().await?);
    let extra = f.entries_dir.join("extra.toml");

    let small: BTreeSet<String> = ["ls", "pwd", "git status", "open github"].iter().map(|s| s.to_string()).collect();
    let mut large = small.clone();
    large.extend(["htop".to_string(), "top".to_string()]);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let (small, large) = (small.clone(), large.clone());
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snap = service.current().await;
                    let ranked = key_set(snap.ranking.keys());
                    let catalog = key_set(snap.catalog.keys().iter().map(String::as_str));
                    assert_eq!(ranked, catalog, "ranking and catalog come from one snapshot");
                    assert!(ranked == small || ranked == large, "unexpected key set {ranked:?}");
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for i in 0..20 {
        if i % 2 == 0 {
            std::fs::write(&extra, "[htop]\ncmd = \"htop\"\n\n[top]\ncmd = \"top\"\n")?;
        } else {
            std::fs::remove_file(&extra)?;
        }
        service.reload().await?;
    }

    for r in futures::future::join_all(readers).await {
        r?;
    }
    Ok(())
}

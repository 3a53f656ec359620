use anyhow::Result;
use std::cmp::Ordering;

use launchrank_core::error::Error;
use launchrank_core::types::{ModelMetadata, RankedEntry, RankingResult};
use launchrank_model::{FeatureAssembler, RankingModel};
use launchrank_store::LoadedModel;

/// Scores candidate keys against a context with one loaded model.
pub struct RankingGenerator {
    model: RankingModel,
    metadata: ModelMetadata,
    assembler: FeatureAssembler,
}

impl std::fmt::Debug for RankingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingGenerator")
            .field("run_id", &self.metadata.run_id)
            .field("embedder_id", &self.assembler.embedder_id())
            .finish()
    }
}

impl RankingGenerator {
    /// Refuses a model whose input width is not `2 x` the embedder dimension.
    pub fn new(loaded: LoadedModel, assembler: FeatureAssembler) -> Result<Self> {
        let LoadedModel { model, metadata } = loaded;
        if model.input_dim() != assembler.feature_dim() {
            return Err(Error::DimensionMismatch { expected: model.input_dim(), actual: assembler.feature_dim() }.into());
        }
        if metadata.embedder_id != assembler.embedder_id() {
            tracing::warn!(
                model = %metadata.embedder_id,
                serving = %assembler.embedder_id(),
                "model was trained with a different embedder"
            );
        }
        Ok(Self { model, metadata, assembler })
    }

    pub fn run_id(&self) -> &str { &self.metadata.run_id }
    pub fn metadata(&self) -> &ModelMetadata { &self.metadata }

    /// Rank every key in `keys` for `context`, highest score first.
    ///
    /// Ties keep the input order. An absent or unknown context falls back to
    /// the neutral embedding, and no keys give an empty result.
    pub fn generate(&self, context: Option<&str>, keys: &[String]) -> Result<RankingResult> {
        if keys.is_empty() {
            return Ok(RankingResult::default());
        }
        let features = self.assembler.assemble_candidates(context, keys)?;
        let scores = self.model.predict(&features)?;
        Ok(order_by_score(keys, &scores))
    }
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Stable descending sort; NaN scores sink to the bottom.
pub fn order_by_score(keys: &[String], scores: &[f32]) -> RankingResult {
    let mut entries: Vec<RankedEntry> = keys
        .iter()
        .zip(scores)
        .map(|(key, &score)| RankedEntry { key: key.clone(), score })
        .collect();
    entries.sort_by(|a, b| sort_key(b.score).partial_cmp(&sort_key(a.score)).unwrap_or(Ordering::Equal));
    RankingResult { entries }
}

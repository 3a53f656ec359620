//! Embedding providers for entry keys.
//!
//! `HashedEmbedder` is dependency-free and deterministic; `BertEmbedder` runs a
//! local sentence-transformer through candle. Both are wrapped in a per-process
//! `CachedEmbedder` by [`get_default_embedder`].
use anyhow::Result;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, PoisonError};

use launchrank_core::config::{EmbeddingBackend, EmbeddingSettings};
use launchrank_core::traits::Embedder;
use twox_hash::XxHash64;

pub mod bert;
pub mod device;
pub mod pool;
pub mod tokenize;

pub use bert::BertEmbedder;
pub use pool::masked_mean_l2;

/// Feature-hashing embedder over lower-cased word and character-trigram tokens.
///
/// Never fails: unseen text hashes like any other, and text without tokens
/// (including the empty string) maps to the zero vector.
pub struct HashedEmbedder { dim: usize, id: String }

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hashed:xxh64:d{}", dim) }
    }

    fn tokens(text: &str) -> Vec<(String, f32)> {
        let lower = text.to_lowercase();
        let mut out = Vec::new();
        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            out.push((word.to_string(), 1.0));
            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for tri in padded.windows(3) {
                out.push((tri.iter().collect(), 0.5));
            }
        }
        out
    }
}

impl Embedder for HashedEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 { return Ok(v); }
        for (token, weight) in Self::tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            let magnitude = 0.5 + 0.5 * (((h >> 32) as u32) as f32 / u32::MAX as f32);
            v[idx] += sign * weight * magnitude;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-6 { for x in &mut v { *x /= norm; } }
        Ok(v)
    }
}

/// Memoises vectors per input text for the life of the process.
pub struct CachedEmbedder<E: Embedder> {
    inner: E,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E) -> Self { Self { inner, cache: Mutex::new(HashMap::new()) } }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(v) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(text) {
            return Ok(v.clone());
        }
        // Computed outside the lock; a racing thread computes the same vector.
        let v = self.inner.embed(text)?;
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(text.to_string(), v.clone());
        Ok(v)
    }
}

/// Embed, falling back to the zero vector when the provider fails or returns
/// the wrong dimension. Unknown keys are never an error.
pub fn embed_or_zero(embedder: &dyn Embedder, text: &str) -> Vec<f32> {
    match embedder.embed(text) {
        Ok(v) if v.len() == embedder.dim() => v,
        Ok(v) => {
            tracing::warn!(text, got = v.len(), expected = embedder.dim(), "embedding has wrong dimension, using zero vector");
            vec![0f32; embedder.dim()]
        }
        Err(e) => {
            tracing::warn!(text, error = %e, "embedding failed, using zero vector");
            vec![0f32; embedder.dim()]
        }
    }
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings() || settings.backend == EmbeddingBackend::Hashed {
        tracing::info!(dim = settings.dim, "using hashed embedder");
        return Ok(Arc::new(CachedEmbedder::new(HashedEmbedder::new(settings.dim))));
    }
    let dir = bert::resolve_model_dir(settings.model_dir.as_deref())?;
    let bert = BertEmbedder::from_dir(&dir, settings.max_len)?;
    if bert.dim() != settings.dim {
        tracing::warn!(configured = settings.dim, model = bert.dim(), "embedding.dim differs from the model; using the model's");
    }
    Ok(Arc::new(CachedEmbedder::new(bert)))
}

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use launchrank_core::traits::Embedder;
use tokenizers::Tokenizer;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

/// Sentence embeddings from a local BERT checkpoint (e.g. all-MiniLM-L6-v2):
/// `tokenizer.json`, `config.json` and `model.safetensors` in one directory.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    pad_id: u32,
    id: String,
}

impl BertEmbedder {
    pub fn from_dir(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading BERT embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.get_padding().map(|p| p.pad_id).unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)?;
        let config: BertConfig = serde_json::from_str(&config_text)?;
        let raw: serde_json::Value = serde_json::from_str(&config_text)?;
        let dim = raw.get("hidden_size").and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let weights_path = model_dir.join("model.safetensors");
        let weights = candle_core::safetensors::load(&weights_path, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "bert".to_string());
        let id = format!("bert:{}:d{}", name, dim);
        tracing::info!(embedder_id = %id, "BERT embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, pad_id, id })
    }
}

impl Embedder for BertEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        if emb.len() != self.dim {
            return Err(anyhow!("BERT produced {} dims, expected {}", emb.len(), self.dim));
        }
        if start.elapsed().as_millis() > 100 { tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}

/// Where to find the BERT files: explicit setting, then `APP_MODEL_DIR`,
/// `MODEL_DIR`, then `models/all-MiniLM-L6-v2` relative to the working dir.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = launchrank_core::config::expand_path(dir);
        if p.exists() { return Ok(p); }
        tracing::warn!(dir = %p.display(), "configured embedding.model_dir does not exist");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { tracing::info!(var, dir = %p.display(), "using model dir from environment"); return Ok(p); }
        }
    }
    let local = Path::new("models/all-MiniLM-L6-v2");
    if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate a BERT model directory (set embedding.model_dir)"))
}

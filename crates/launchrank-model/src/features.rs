use anyhow::Result;
use candle_core::{Device, Tensor};
use std::sync::Arc;

use launchrank_core::traits::Embedder;
use launchrank_core::types::{Dataset, TrainingExample};
use launchrank_embed::embed_or_zero;

/// Row-major `rows x cols` feature block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl FeatureMatrix {
    pub fn new(cols: usize) -> Self { Self { data: Vec::new(), rows: 0, cols } }

    pub fn with_capacity(rows: usize, cols: usize) -> Self {
        Self { data: Vec::with_capacity(rows * cols), rows: 0, cols }
    }

    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        anyhow::ensure!(row.len() == self.cols, "feature row has {} columns, expected {}", row.len(), self.cols);
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize { self.rows }
    pub fn cols(&self) -> usize { self.cols }
    pub fn is_empty(&self) -> bool { self.rows == 0 }

    pub fn row(&self, i: usize) -> &[f32] { &self.data[i * self.cols..(i + 1) * self.cols] }

    /// Copy out the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> FeatureMatrix {
        let mut out = FeatureMatrix::with_capacity(indices.len(), self.cols);
        for &i in indices {
            out.data.extend_from_slice(self.row(i));
            out.rows += 1;
        }
        out
    }

    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::from_slice(&self.data, (self.rows, self.cols), device)
    }
}

/// Builds model inputs as `embed(key) ++ embed(previous_key)`.
///
/// This order is part of every trained model's contract. The same assembler
/// feeds training and serving. A missing previous key contributes zeros.
#[derive(Clone)]
pub struct FeatureAssembler {
    embedder: Arc<dyn Embedder>,
}

impl FeatureAssembler {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self { Self { embedder } }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }
    pub fn embedder_id(&self) -> &str { self.embedder.embedder_id() }
    pub fn embedding_dim(&self) -> usize { self.embedder.dim() }
    pub fn feature_dim(&self) -> usize { 2 * self.embedder.dim() }

    fn context_vector(&self, previous_key: Option<&str>) -> Vec<f32> {
        match previous_key {
            Some(p) => embed_or_zero(self.embedder.as_ref(), p),
            None => vec![0f32; self.embedding_dim()],
        }
    }

    pub fn assemble(&self, key: &str, previous_key: Option<&str>) -> Vec<f32> {
        let mut v = embed_or_zero(self.embedder.as_ref(), key);
        v.extend(self.context_vector(previous_key));
        v
    }

    pub fn assemble_example(&self, row: &TrainingExample) -> Vec<f32> {
        self.assemble(&row.key, Some(&row.previous_key))
    }

    pub fn assemble_dataset(&self, dataset: &Dataset) -> Result<FeatureMatrix> {
        let mut m = FeatureMatrix::with_capacity(dataset.len(), self.feature_dim());
        for row in &dataset.rows {
            m.push_row(&self.assemble_example(row))?;
        }
        Ok(m)
    }

    /// One row per candidate key against a shared context, in input order.
    pub fn assemble_candidates(&self, context: Option<&str>, keys: &[String]) -> Result<FeatureMatrix> {
        let ctx = self.context_vector(context);
        let mut m = FeatureMatrix::with_capacity(keys.len(), self.feature_dim());
        let mut row = Vec::with_capacity(self.feature_dim());
        for key in keys {
            row.clear();
            row.extend(embed_or_zero(self.embedder.as_ref(), key));
            row.extend_from_slice(&ctx);
            m.push_row(&row)?;
        }
        Ok(m)
    }
}

use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Linear, Module, VarBuilder};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::path::Path;

use launchrank_core::error::Error;

use crate::features::FeatureMatrix;

pub const WEIGHTS_FILE: &str = "model.safetensors";

/// One-hidden-layer regressor: `Linear(input -> hidden) -> ReLU -> Linear(hidden -> 1)`.
pub struct RankingModel {
    hidden: Linear,
    output: Linear,
    input_dim: usize,
    hidden_units: usize,
    device: Device,
}

impl std::fmt::Debug for RankingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingModel")
            .field("input_dim", &self.input_dim)
            .field("hidden_units", &self.hidden_units)
            .finish()
    }
}

fn uniform_var(rng: &mut StdRng, dims: &[usize], fan_in: usize, device: &Device) -> Result<Var> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    let values: Vec<f32> = (0..dims.iter().product::<usize>()).map(|_| rng.gen_range(-bound..=bound)).collect();
    Ok(Var::from_tensor(&Tensor::from_vec(values, dims, device)?)?)
}

impl RankingModel {
    /// Fresh weights drawn from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`. Returns the
    /// model and its trainable variables.
    pub(crate) fn init(input_dim: usize, hidden_units: usize, rng: &mut StdRng, device: &Device) -> Result<(Self, Vec<Var>)> {
        let hw = uniform_var(rng, &[hidden_units, input_dim], input_dim, device)?;
        let hb = uniform_var(rng, &[hidden_units], input_dim, device)?;
        let ow = uniform_var(rng, &[1, hidden_units], hidden_units, device)?;
        let ob = uniform_var(rng, &[1], hidden_units, device)?;
        let hidden = Linear::new(hw.as_tensor().clone(), Some(hb.as_tensor().clone()));
        let output = Linear::new(ow.as_tensor().clone(), Some(ob.as_tensor().clone()));
        let model = Self { hidden, output, input_dim, hidden_units, device: device.clone() };
        Ok((model, vec![hw, hb, ow, ob]))
    }

    pub fn input_dim(&self) -> usize { self.input_dim }
    pub fn hidden_units(&self) -> usize { self.hidden_units }
    pub fn device(&self) -> &Device { &self.device }

    pub(crate) fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.hidden.forward(x)?.relu()?;
        self.output.forward(&h)?.squeeze(1)
    }

    /// Score every row. An empty matrix yields an empty result.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f32>> {
        if features.cols() != self.input_dim {
            return Err(Error::DimensionMismatch { expected: self.input_dim, actual: features.cols() }.into());
        }
        if features.is_empty() { return Ok(Vec::new()); }
        let x = features.to_tensor(&self.device)?;
        Ok(self.forward(&x)?.to_device(&Device::Cpu)?.to_vec1::<f32>()?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut tensors: HashMap<String, Tensor> = HashMap::new();
        tensors.insert("hidden.weight".into(), self.hidden.weight().clone());
        tensors.insert("output.weight".into(), self.output.weight().clone());
        if let Some(b) = self.hidden.bias() { tensors.insert("hidden.bias".into(), b.clone()); }
        if let Some(b) = self.output.bias() { tensors.insert("output.bias".into(), b.clone()); }
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }

    pub fn load(path: &Path, input_dim: usize, hidden_units: usize) -> Result<Self> {
        let device = Device::Cpu;
        let tensors = candle_core::safetensors::load(path, &device)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let hidden = candle_nn::linear(input_dim, hidden_units, vb.pp("hidden"))?;
        let output = candle_nn::linear(hidden_units, 1, vb.pp("output"))?;
        Ok(Self { hidden, output, input_dim, hidden_units, device })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn rejects_wrong_feature_width() {
        let mut rng = StdRng::seed_from_u64(1);
        let (model, _) = RankingModel::init(4, 3, &mut rng, &Device::Cpu).unwrap();
        let mut m = FeatureMatrix::new(5);
        m.push_row(&[0.0; 5]).unwrap();
        let err = model.predict(&m).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DimensionMismatch { expected: 4, actual: 5 })));
    }

    #[test]
    fn save_then_load_predicts_identically() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(WEIGHTS_FILE);
        let mut rng = StdRng::seed_from_u64(7);
        let (model, _) = RankingModel::init(6, 4, &mut rng, &Device::Cpu).unwrap();
        let mut m = FeatureMatrix::new(6);
        m.push_row(&[0.1, -0.2, 0.3, 0.0, 0.5, 1.0]).unwrap();
        m.push_row(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();

        model.save(&path).unwrap();
        let loaded = RankingModel::load(&path, 6, 4).unwrap();
        assert_eq!(model.predict(&m).unwrap(), loaded.predict(&m).unwrap());
    }
}

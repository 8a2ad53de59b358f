// src/weights.rs

use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, TaggerError};
use crate::transform::NamedParameters;

/// What a parameter is used for; decides how a fresh one is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Weight,
    Bias,
    Scale,
    RunningMean,
    RunningVariance,
}

/// Supplies parameter arrays while a model is being bound.
pub trait ParameterSource {
    fn fetch(&mut self, name: &str, shape: &[usize], kind: ParamKind) -> Result<ArrayD<f32>>;
}

/// Fresh parameters: Glorot-uniform weights, zero biases and means, unit
/// scales and variances. Same seed, same parameters.
#[derive(Debug)]
pub struct Initializer {
    rng: ChaCha8Rng,
}

impl Initializer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn glorot_uniform(&mut self, shape: &[usize]) -> ArrayD<f32> {
        let fan_in = shape.first().copied().unwrap_or(1);
        let fan_out = shape.last().copied().unwrap_or(1);
        let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
        let rng = &mut self.rng;
        ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen_range(-limit..limit))
    }
}

impl ParameterSource for Initializer {
    fn fetch(&mut self, name: &str, shape: &[usize], kind: ParamKind) -> Result<ArrayD<f32>> {
        log::debug!("initializing {} {:?} as {:?}", name, shape, kind);
        Ok(match kind {
            ParamKind::Weight => self.glorot_uniform(shape),
            ParamKind::Bias | ParamKind::RunningMean => ArrayD::zeros(IxDyn(shape)),
            ParamKind::Scale | ParamKind::RunningVariance => ArrayD::ones(IxDyn(shape)),
        })
    }
}

/// Named F32 tensors held in memory, read from or written to a
/// `.safetensors` file.
#[derive(Debug, Default, Clone)]
pub struct WeightStore {
    tensors: HashMap<String, ArrayD<f32>>,
}

impl WeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(params: NamedParameters) -> Self {
        Self {
            tensors: params.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, array: ArrayD<f32>) {
        self.tensors.insert(name.into(), array);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tensors = SafeTensors::deserialize(bytes)?;
        let mut store = Self::new();
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(TaggerError::UnsupportedDtype {
                    name,
                    dtype: format!("{:?}", view.dtype()),
                });
            }
            let data: Vec<f32> = view
                .data()
                .chunks_exact(std::mem::size_of::<f32>())
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), data)?;
            store.tensors.insert(name, array);
        }
        Ok(store)
    }

    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(TaggerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("weights file not found at: {}", path),
            )));
        }
        let bytes = std::fs::read(path)?;
        let store = Self::from_bytes(&bytes)?;
        log::info!("loaded {} tensors from {}", store.len(), path);
        Ok(store)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let contiguous: Vec<(&str, Vec<f32>, Vec<usize>)> = self
            .names()
            .into_iter()
            .filter_map(|name| {
                self.tensors
                    .get(name)
                    .map(|a| (name, a.iter().copied().collect(), a.shape().to_vec()))
            })
            .collect();

        let mut views = Vec::with_capacity(contiguous.len());
        for (name, data, shape) in &contiguous {
            let bytes: &[u8] = bytemuck::cast_slice(data.as_slice());
            views.push((*name, TensorView::new(Dtype::F32, shape.clone(), bytes)?));
        }
        Ok(safetensors::serialize(views, &None)?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        log::info!("saved {} tensors to {}", self.len(), path);
        Ok(())
    }
}

impl ParameterSource for WeightStore {
    fn fetch(&mut self, name: &str, shape: &[usize], _kind: ParamKind) -> Result<ArrayD<f32>> {
        let array = self
            .tensors
            .get(name)
            .ok_or_else(|| TaggerError::MissingParameter(name.to_string()))?;
        if array.shape() != shape {
            return Err(TaggerError::ParameterShape {
                name: name.to_string(),
                expected: shape.to_vec(),
                actual: array.shape().to_vec(),
            });
        }
        Ok(array.clone())
    }
}

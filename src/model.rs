use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};
use rayon::prelude::*;

use crate::batch_norm::BatchNorm;
use crate::cell::LstmCell;
use crate::common::argmax_rows;
use crate::config::{EncoderKind, ModelConfig};
use crate::dense::Dense;
use crate::embedding::Embedding;
use crate::error::{Result, TaggerError};
use crate::lookahead::Lookahead;
use crate::recurrence::{BiRecurrence, Recurrence};
use crate::transform::{NamedParameters, SequenceTransform, Sequential};
use crate::weights::{ParamKind, ParameterSource, WeightStore};

pub const EMBEDDING_PREFIX: &str = "embedding";
pub const ENCODER_PREFIX: &str = "encoder";
pub const CLASSIFIER_PREFIX: &str = "classifier";

/// One encoder layer in a [`ModelSpec`] plan.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerPlan {
    BatchNorm { dim: usize },
    Lookahead { dim: usize },
    Recurrence { input_dim: usize, hidden_dim: usize },
    BiRecurrence { input_dim: usize, hidden_dim: usize },
}

impl LayerPlan {
    pub fn output_dim(&self) -> usize {
        match *self {
            LayerPlan::BatchNorm { dim } => dim,
            LayerPlan::Lookahead { dim } => 2 * dim,
            LayerPlan::Recurrence { hidden_dim, .. } => hidden_dim,
            LayerPlan::BiRecurrence { hidden_dim, .. } => 2 * hidden_dim,
        }
    }

    fn parameter_shapes(&self, prefix: &str) -> Vec<(String, Vec<usize>, ParamKind)> {
        let lstm = |prefix: &str, input_dim: usize, hidden_dim: usize| {
            LstmCell::parameter_shapes(input_dim, hidden_dim)
                .into_iter()
                .map(|(name, shape)| {
                    let kind = if name == "b" { ParamKind::Bias } else { ParamKind::Weight };
                    (format!("{}.{}", prefix, name), shape, kind)
                })
                .collect::<Vec<_>>()
        };
        match *self {
            LayerPlan::BatchNorm { dim } => vec![
                (format!("{}.scale", prefix), vec![dim], ParamKind::Scale),
                (format!("{}.bias", prefix), vec![dim], ParamKind::Bias),
                (format!("{}.running_mean", prefix), vec![dim], ParamKind::RunningMean),
                (format!("{}.running_var", prefix), vec![dim], ParamKind::RunningVariance),
            ],
            LayerPlan::Lookahead { .. } => Vec::new(),
            LayerPlan::Recurrence { input_dim, hidden_dim } => lstm(prefix, input_dim, hidden_dim),
            LayerPlan::BiRecurrence { input_dim, hidden_dim } => {
                let mut shapes = lstm(&format!("{}.fwd", prefix), input_dim, hidden_dim);
                shapes.extend(lstm(&format!("{}.bwd", prefix), input_dim, hidden_dim));
                shapes
            }
        }
    }
}

/// Validated, immutable description of a tagger. Holds no parameters;
/// [`ModelSpec::bind`] allocates them.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    config: ModelConfig,
    encoder: Vec<LayerPlan>,
}

impl ModelSpec {
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let mut encoder = Vec::new();
        let mut width = config.emb_dim;
        if config.batch_norm {
            encoder.push(LayerPlan::BatchNorm { dim: width });
        }
        match config.encoder {
            EncoderKind::Recurrent => {
                encoder.push(LayerPlan::Recurrence {
                    input_dim: width,
                    hidden_dim: config.hidden_dim,
                });
            }
            EncoderKind::Lookahead => {
                encoder.push(LayerPlan::Lookahead { dim: width });
                width *= 2;
                encoder.push(LayerPlan::Recurrence {
                    input_dim: width,
                    hidden_dim: config.hidden_dim,
                });
            }
            EncoderKind::Bidirectional => {
                encoder.push(LayerPlan::BiRecurrence {
                    input_dim: width,
                    hidden_dim: config.hidden_dim / 2,
                });
            }
        }
        width = config.hidden_dim;
        if config.batch_norm {
            encoder.push(LayerPlan::BatchNorm { dim: width });
        }
        Ok(Self { config, encoder })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn encoder_plan(&self) -> &[LayerPlan] {
        &self.encoder
    }

    /// Every named parameter the bound model will own, in bind order.
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        self.parameter_plan()
            .into_iter()
            .map(|(name, shape, _)| (name, shape))
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_plan()
            .iter()
            .map(|(_, shape, _)| shape.iter().product::<usize>())
            .sum()
    }

    fn parameter_plan(&self) -> Vec<(String, Vec<usize>, ParamKind)> {
        let c = &self.config;
        let mut plan = vec![(
            format!("{}.weight", EMBEDDING_PREFIX),
            vec![c.vocab_size, c.emb_dim],
            ParamKind::Weight,
        )];
        for (i, layer) in self.encoder.iter().enumerate() {
            plan.extend(layer.parameter_shapes(&format!("{}.{}", ENCODER_PREFIX, i)));
        }
        plan.push((
            format!("{}.weight", CLASSIFIER_PREFIX),
            vec![c.hidden_dim, c.num_labels],
            ParamKind::Weight,
        ));
        plan.push((
            format!("{}.bias", CLASSIFIER_PREFIX),
            vec![c.num_labels],
            ParamKind::Bias,
        ));
        plan
    }

    /// Instantiates every layer with parameters drawn from `source`.
    pub fn bind(&self, source: &mut dyn ParameterSource) -> Result<SlotTagger> {
        let c = &self.config;

        let table = fetch2(
            source,
            EMBEDDING_PREFIX,
            "weight",
            &[c.vocab_size, c.emb_dim],
            ParamKind::Weight,
        )?;
        let mut embedding = Embedding::new(table)?;
        if let Some(unk) = c.unknown_token {
            embedding = embedding.with_unknown_token(unk)?;
        }

        let mut layers: Vec<Box<dyn SequenceTransform>> = Vec::with_capacity(self.encoder.len());
        for (i, layer) in self.encoder.iter().enumerate() {
            let prefix = format!("{}.{}", ENCODER_PREFIX, i);
            let bound: Box<dyn SequenceTransform> = match *layer {
                LayerPlan::BatchNorm { dim } => Box::new(BatchNorm::new(
                    fetch1(source, &prefix, "scale", dim, ParamKind::Scale)?,
                    fetch1(source, &prefix, "bias", dim, ParamKind::Bias)?,
                    fetch1(source, &prefix, "running_mean", dim, ParamKind::RunningMean)?,
                    fetch1(source, &prefix, "running_var", dim, ParamKind::RunningVariance)?,
                    c.batch_norm_epsilon,
                )?),
                LayerPlan::Lookahead { dim } => {
                    Box::new(Lookahead::new(dim).with_pad(c.lookahead_pad))
                }
                LayerPlan::Recurrence { input_dim, hidden_dim } => {
                    let cell = bind_lstm(source, &prefix, input_dim, hidden_dim)?;
                    Box::new(Recurrence::forward_scan(cell).with_initial_state(c.initial_state))
                }
                LayerPlan::BiRecurrence { input_dim, hidden_dim } => {
                    let fwd = bind_lstm(source, &format!("{}.fwd", prefix), input_dim, hidden_dim)?;
                    let bwd = bind_lstm(source, &format!("{}.bwd", prefix), input_dim, hidden_dim)?;
                    Box::new(
                        BiRecurrence::new(fwd, bwd)?
                            .with_output_dim(c.hidden_dim)?
                            .with_initial_state(c.initial_state)
                            .with_backward_initial_state(c.backward_state()),
                    )
                }
            };
            log::debug!("bound {} as {}", prefix, bound.describe());
            layers.push(bound);
        }
        let encoder = Sequential::new(layers)?;

        let classifier = Dense::new(
            fetch2(
                source,
                CLASSIFIER_PREFIX,
                "weight",
                &[c.hidden_dim, c.num_labels],
                ParamKind::Weight,
            )?,
            fetch1(source, CLASSIFIER_PREFIX, "bias", c.num_labels, ParamKind::Bias)?,
        )?;

        if encoder.output_dim() != classifier.input_dim() {
            return Err(TaggerError::mismatch(
                "classifier input",
                classifier.input_dim(),
                encoder.output_dim(),
            ));
        }

        Ok(SlotTagger {
            spec: self.clone(),
            embedding,
            encoder,
            classifier,
        })
    }
}

fn fetch1(
    source: &mut dyn ParameterSource,
    prefix: &str,
    name: &str,
    len: usize,
    kind: ParamKind,
) -> Result<Array1<f32>> {
    let full = format!("{}.{}", prefix, name);
    Ok(source.fetch(&full, &[len], kind)?.into_dimensionality::<Ix1>()?)
}

fn fetch2(
    source: &mut dyn ParameterSource,
    prefix: &str,
    name: &str,
    shape: &[usize; 2],
    kind: ParamKind,
) -> Result<Array2<f32>> {
    let full = format!("{}.{}", prefix, name);
    Ok(source.fetch(&full, shape, kind)?.into_dimensionality::<Ix2>()?)
}

fn bind_lstm(
    source: &mut dyn ParameterSource,
    prefix: &str,
    input_dim: usize,
    hidden_dim: usize,
) -> Result<LstmCell> {
    let packed = LstmCell::GATES * hidden_dim;
    LstmCell::new(
        fetch2(source, prefix, "w", &[input_dim, packed], ParamKind::Weight)?,
        fetch2(source, prefix, "u", &[hidden_dim, packed], ParamKind::Weight)?,
        fetch1(source, prefix, "b", packed, ParamKind::Bias)?,
    )
}

/// A bound slot tagger: embedding, encoder stack and per-position classifier.
/// Read-only after binding; share it by reference across threads.
#[derive(Debug)]
pub struct SlotTagger {
    spec: ModelSpec,
    embedding: Embedding,
    encoder: Sequential,
    classifier: Dense,
}

impl SlotTagger {
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn encoder(&self) -> &Sequential {
        &self.encoder
    }

    /// Encoder features, `[tokens.len(), hidden_dim]`.
    pub fn encode(&self, tokens: &[u32]) -> Result<Array2<f32>> {
        let embedded = self.embedding.lookup(tokens)?;
        self.encoder.forward(embedded.view())
    }

    /// Per-position label scores, `[tokens.len(), num_labels]`.
    pub fn logits(&self, tokens: &[u32]) -> Result<Array2<f32>> {
        let features = self.encode(tokens)?;
        self.classifier.forward(features.view())
    }

    /// Best label id for every token.
    pub fn tag(&self, tokens: &[u32]) -> Result<Vec<u32>> {
        let scores = self.logits(tokens)?;
        argmax_rows(scores.view())
    }

    pub fn tag_batch(&self, batch: &[Vec<u32>]) -> Result<Vec<Vec<u32>>> {
        batch.par_iter().map(|tokens| self.tag(tokens)).collect()
    }

    pub fn parameters(&self) -> NamedParameters {
        let mut params = NamedParameters::new();
        self.embedding.export_parameters(EMBEDDING_PREFIX, &mut params);
        self.encoder.export_parameters(ENCODER_PREFIX, &mut params);
        self.classifier.export_parameters(CLASSIFIER_PREFIX, &mut params);
        params
    }

    pub fn parameter(&self, name: &str) -> Option<ArrayD<f32>> {
        self.parameters()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    pub fn save_weights(&self, path: &str) -> Result<()> {
        WeightStore::from_parameters(self.parameters()).save(path)
    }
}

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, TaggerError};
use crate::recurrence::DEFAULT_INITIAL_STATE;

/// Which encoder sits between the embedding and the classifier.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// A single forward LSTM recurrence.
    #[default]
    Recurrent,
    /// Each position sees its own embedding spliced with the next one.
    Lookahead,
    /// A forward and a backward LSTM, each `hidden_dim / 2` wide.
    Bidirectional,
}

/// Hyper-parameters of the slot tagger. Defaults match the ATIS setup:
/// 943 query words, 129 slot labels, 150-wide embeddings, 300-wide encoder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub vocab_size: usize,
    #[serde(alias = "label_dim")]
    pub num_labels: usize,
    pub emb_dim: usize,
    pub hidden_dim: usize,
    pub encoder: EncoderKind,
    /// Insert batch normalization after the embedding and after the encoder.
    pub batch_norm: bool,
    pub batch_norm_epsilon: f32,
    /// Constant broadcast into every recurrent state dimension at sequence start.
    pub initial_state: f32,
    /// Overrides `initial_state` for the backward direction of the bidirectional encoder.
    pub backward_initial_state: Option<f32>,
    /// Value used for the missing future half at the last position of a lookahead encoder.
    pub lookahead_pad: f32,
    /// Token id substituted for out-of-vocabulary ids; `None` rejects them.
    pub unknown_token: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 943,
            num_labels: 129,
            emb_dim: 150,
            hidden_dim: 300,
            encoder: EncoderKind::Recurrent,
            batch_norm: false,
            batch_norm_epsilon: 1e-5,
            initial_state: DEFAULT_INITIAL_STATE,
            backward_initial_state: None,
            lookahead_pad: 0.0,
            unknown_token: None,
        }
    }
}

impl ModelConfig {
    pub fn load(config_path: &str) -> Result<Self> {
        if !Path::new(config_path).exists() {
            return Err(TaggerError::InvalidConfig(format!(
                "config file not found at: {}",
                config_path
            )));
        }

        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: ModelConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::info!("loaded model config from {}: {:?} encoder", config_path, config.encoder);
        Ok(config)
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("vocab_size", self.vocab_size),
            ("num_labels", self.num_labels),
            ("emb_dim", self.emb_dim),
            ("hidden_dim", self.hidden_dim),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(TaggerError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.encoder == EncoderKind::Bidirectional && self.hidden_dim % 2 != 0 {
            return Err(TaggerError::InvalidConfig(format!(
                "bidirectional encoder splits hidden_dim across two cells, {} is odd",
                self.hidden_dim
            )));
        }
        if !self.initial_state.is_finite()
            || !self.backward_initial_state.map_or(true, f32::is_finite)
        {
            return Err(TaggerError::InvalidConfig(
                "initial states must be finite".to_string(),
            ));
        }
        if self.batch_norm_epsilon.is_nan() || self.batch_norm_epsilon <= 0.0 {
            return Err(TaggerError::InvalidConfig(
                "batch_norm_epsilon must be positive".to_string(),
            ));
        }
        if let Some(unk) = self.unknown_token {
            if unk as usize >= self.vocab_size {
                return Err(TaggerError::TokenOutOfVocabulary {
                    id: unk,
                    vocab_size: self.vocab_size,
                });
            }
        }
        Ok(())
    }

    pub fn backward_state(&self) -> f32 {
        self.backward_initial_state.unwrap_or(self.initial_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ModelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_state, 0.1);
        assert_eq!(config.backward_state(), 0.1);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"encoder": "bidirectional", "label_dim": 10}"#).unwrap();
        assert_eq!(config.encoder, EncoderKind::Bidirectional);
        assert_eq!(config.num_labels, 10);
        assert_eq!(config.hidden_dim, 300);
    }

    #[test]
    fn odd_bidirectional_width_rejected() {
        let config = ModelConfig {
            encoder: EncoderKind::Bidirectional,
            hidden_dim: 301,
            ..ModelConfig::default()
        };
        assert!(matches!(config.validate(), Err(TaggerError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_token_must_be_in_vocab() {
        let config = ModelConfig {
            vocab_size: 10,
            unknown_token: Some(10),
            ..ModelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TaggerError::TokenOutOfVocabulary { id: 10, vocab_size: 10 })
        ));
    }

    #[test]
    fn load_missing_file() {
        let result = ModelConfig::load("/definitely/not/here.json");
        assert!(result.is_err());
    }

    #[test]
    fn save_then_load() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.json");
        let path = path.to_str().ok_or("non-utf8 temp path")?;
        let config = ModelConfig {
            encoder: EncoderKind::Lookahead,
            batch_norm: true,
            backward_initial_state: Some(0.0),
            ..ModelConfig::default()
        };
        config.save(path)?;
        assert_eq!(ModelConfig::load(path)?, config);
        Ok(())
    }
}

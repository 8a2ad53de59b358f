use ndarray::{Array2, Axis};

use crate::error::{Result, TaggerError};
use crate::transform::NamedParameters;

/// Token id -> dense vector lookup table.
#[derive(Debug, Clone)]
pub struct Embedding {
    table: Array2<f32>, // [vocab_size, dim]
    unknown: Option<u32>,
}

impl Embedding {
    pub fn new(table: Array2<f32>) -> Result<Self> {
        let (vocab_size, dim) = table.dim();
        if vocab_size == 0 || dim == 0 {
            return Err(TaggerError::InvalidConfig(format!(
                "embedding table must be non-empty, got {}x{}",
                vocab_size, dim
            )));
        }
        Ok(Self {
            table,
            unknown: None,
        })
    }

    /// Ids outside the table are looked up as `id` instead of failing.
    pub fn with_unknown_token(mut self, id: u32) -> Result<Self> {
        if id as usize >= self.vocab_size() {
            return Err(TaggerError::TokenOutOfVocabulary {
                id,
                vocab_size: self.vocab_size(),
            });
        }
        self.unknown = Some(id);
        Ok(self)
    }

    pub fn vocab_size(&self) -> usize {
        self.table.nrows()
    }

    pub fn dim(&self) -> usize {
        self.table.ncols()
    }

    fn resolve(&self, id: u32) -> Result<usize> {
        if (id as usize) < self.vocab_size() {
            return Ok(id as usize);
        }
        match self.unknown {
            Some(unk) => {
                log::trace!("token {} mapped to unknown token {}", id, unk);
                Ok(unk as usize)
            }
            None => Err(TaggerError::TokenOutOfVocabulary {
                id,
                vocab_size: self.vocab_size(),
            }),
        }
    }

    /// Returns `[tokens.len(), dim]`.
    pub fn lookup(&self, tokens: &[u32]) -> Result<Array2<f32>> {
        let rows = tokens
            .iter()
            .map(|&id| self.resolve(id))
            .collect::<Result<Vec<usize>>>()?;
        Ok(self.table.select(Axis(0), &rows))
    }

    pub fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        out.push((format!("{}.weight", prefix), self.table.clone().into_dyn()));
    }
}

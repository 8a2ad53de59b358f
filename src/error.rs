use thiserror::Error;

/// Errors raised while configuring, binding or running a tagger.
#[derive(Debug, Error)]
pub enum TaggerError {
    /// Two components disagree on a width. Raised at construction time or
    /// before a scan starts, never half-way through a sequence.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("token id {id} is outside the vocabulary of size {vocab_size}")]
    TokenOutOfVocabulary { id: u32, vocab_size: usize },

    #[error("word '{0}' is not in the vocabulary")]
    UnknownWord(String),

    #[error("parameter '{0}' not found")]
    MissingParameter(String),

    #[error("parameter '{name}' has shape {actual:?}, expected {expected:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("parameter '{name}' has unsupported dtype {dtype}, only F32 is supported")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("malformed CTF input at line {line}: {message}")]
    Ctf { line: usize, message: String },

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("safetensors: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl TaggerError {
    pub(crate) fn mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        TaggerError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_both_widths() {
        let err = TaggerError::mismatch("BiRecurrence backward cell input", 150, 120);
        let msg = err.to_string();
        assert!(msg.contains("BiRecurrence backward cell input"));
        assert!(msg.contains("expected 150"));
        assert!(msg.contains("got 120"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TaggerError = io.into();
        assert!(matches!(err, TaggerError::Io(_)));
    }
}

//! Slot tagging for ATIS-style queries: token embeddings, a recurrent
//! sequence encoder (forward, lookahead or bidirectional) and a per-position
//! label classifier, running inference on frozen parameters.

pub mod batch_norm;
pub mod cell;
pub mod common;
pub mod config;
pub mod ctf;
pub mod dense;
pub mod embedding;
pub mod error;
pub mod lookahead;
pub mod metrics;
pub mod model;
pub mod recurrence;
pub mod transform;
pub mod vocab;
pub mod weights;

pub use cell::{CellState, LstmCell, RecurrentCell};
pub use config::{EncoderKind, ModelConfig};
pub use error::{Result, TaggerError};
pub use model::{ModelSpec, SlotTagger};
pub use recurrence::{BiRecurrence, Direction, Recurrence};
pub use transform::{SequenceTransform, Sequential};
pub use weights::{Initializer, ParameterSource, WeightStore};

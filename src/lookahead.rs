use ndarray::{s, Array2, ArrayView2};

use crate::error::Result;
use crate::transform::SequenceTransform;

/// Splices every position with the next one: `y[t] = concat(x[t], x[t+1])`.
/// The last position has no successor and gets `pad` in its future half.
#[derive(Debug, Clone)]
pub struct Lookahead {
    dim: usize,
    pad: f32,
}

impl Lookahead {
    pub fn new(dim: usize) -> Self {
        Self { dim, pad: 0.0 }
    }

    pub fn with_pad(mut self, pad: f32) -> Self {
        self.pad = pad;
        self
    }
}

impl SequenceTransform for Lookahead {
    fn input_dim(&self) -> usize {
        self.dim
    }

    fn output_dim(&self) -> usize {
        2 * self.dim
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        let len = input.nrows();
        let mut out = Array2::from_elem((len, self.output_dim()), self.pad);
        out.slice_mut(s![.., ..self.dim]).assign(&input);
        if len > 1 {
            out.slice_mut(s![..len - 1, self.dim..])
                .assign(&input.slice(s![1.., ..]));
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("Lookahead({} -> {})", self.dim, self.output_dim())
    }
}

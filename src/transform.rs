// src/transform.rs

use ndarray::{Array2, ArrayD, ArrayView2};
use rayon::prelude::*;

use crate::error::{Result, TaggerError};

/// Named parameter arrays, in export order.
pub type NamedParameters = Vec<(String, ArrayD<f32>)>;

/// A layer mapping a sequence of feature vectors (`[len, input_dim]`) to a
/// sequence of feature vectors (`[len, output_dim]`).
///
/// Implementations hold their parameters by value and never mutate them in
/// `forward`, so one instance can serve many sequences concurrently.
pub trait SequenceTransform: std::fmt::Debug + Send + Sync {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Short layer name for logs and model summaries.
    fn describe(&self) -> String;

    /// Appends this layer's parameters under `prefix`.
    fn export_parameters(&self, _prefix: &str, _out: &mut NamedParameters) {}

    fn check_input(&self, input: ArrayView2<f32>) -> Result<()> {
        if input.ncols() != self.input_dim() {
            return Err(TaggerError::mismatch(
                format!("{} input width", self.describe()),
                self.input_dim(),
                input.ncols(),
            ));
        }
        Ok(())
    }

    /// Runs a batch of sequences of possibly different lengths.
    fn forward_batch(&self, inputs: &[Array2<f32>]) -> Result<Vec<Array2<f32>>> {
        inputs.par_iter().map(|x| self.forward(x.view())).collect()
    }
}

/// Layers applied one after another. Adjacent widths are checked when the
/// stack is built.
#[derive(Debug)]
pub struct Sequential {
    layers: Vec<Box<dyn SequenceTransform>>,
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn SequenceTransform>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(TaggerError::InvalidConfig(
                "Sequential needs at least one layer".to_string(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(TaggerError::mismatch(
                    format!(
                        "layer {} ({}) input, fed by layer {} ({})",
                        i + 1,
                        pair[1].describe(),
                        i,
                        pair[0].describe()
                    ),
                    pair[1].input_dim(),
                    pair[0].output_dim(),
                ));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Box<dyn SequenceTransform>] {
        &self.layers
    }
}

impl SequenceTransform for Sequential {
    fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        let mut hidden = self.layers[0].forward(input)?;
        for layer in &self.layers[1..] {
            hidden = layer.forward(hidden.view())?;
        }
        Ok(hidden)
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.layers.iter().map(|l| l.describe()).collect();
        format!("Sequential[{}]", names.join(" -> "))
    }

    fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        for (i, layer) in self.layers.iter().enumerate() {
            layer.export_parameters(&format!("{}.{}", prefix, i), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    /// Doubles every value; optionally widens by repeating the row.
    #[derive(Debug)]
    struct Doubler {
        dim: usize,
        repeat: usize,
    }

    impl SequenceTransform for Doubler {
        fn input_dim(&self) -> usize {
            self.dim
        }
        fn output_dim(&self) -> usize {
            self.dim * self.repeat
        }
        fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
            self.check_input(input)?;
            let mut out = Array2::zeros((input.nrows(), self.output_dim()));
            for (t, row) in input.rows().into_iter().enumerate() {
                for r in 0..self.repeat {
                    for (j, v) in row.iter().enumerate() {
                        out[[t, r * self.dim + j]] = v * 2.0;
                    }
                }
            }
            Ok(out)
        }
        fn describe(&self) -> String {
            format!("Doubler({}x{})", self.dim, self.repeat)
        }
    }

    #[test]
    fn sequential_chains_layers() {
        let seq = Sequential::new(vec![
            Box::new(Doubler { dim: 2, repeat: 2 }),
            Box::new(Doubler { dim: 4, repeat: 1 }),
        ])
        .unwrap();
        assert_eq!(seq.input_dim(), 2);
        assert_eq!(seq.output_dim(), 4);
        let out = seq.forward(arr2(&[[1.0f32, 2.0]]).view()).unwrap();
        assert_eq!(out, arr2(&[[4.0f32, 8.0, 4.0, 8.0]]));
    }

    #[test]
    fn sequential_rejects_width_gap() {
        let err = Sequential::new(vec![
            Box::new(Doubler { dim: 2, repeat: 2 }),
            Box::new(Doubler { dim: 3, repeat: 1 }),
        ])
        .unwrap_err();
        match err {
            TaggerError::DimensionMismatch { expected, actual, .. } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sequential_rejects_empty() {
        assert!(Sequential::new(Vec::new()).is_err());
    }

    #[test]
    fn forward_batch_keeps_lengths() {
        let layer = Doubler { dim: 1, repeat: 1 };
        let batch = vec![
            Array2::zeros((3, 1)),
            Array2::zeros((0, 1)),
            Array2::ones((5, 1)),
        ];
        let out = layer.forward_batch(&batch).unwrap();
        let lens: Vec<usize> = out.iter().map(|a| a.nrows()).collect();
        assert_eq!(lens, vec![3, 0, 5]);
        assert_eq!(out[2][[4, 0]], 2.0);
    }

    #[test]
    fn check_input_reports_widths() {
        let layer = Doubler { dim: 3, repeat: 1 };
        let err = layer.forward(Array2::zeros((2, 4)).view()).unwrap_err();
        assert!(err.to_string().contains("expected 3, got 4"));
    }
}

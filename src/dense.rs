use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::common::{sigmoid, tanh};
use crate::error::{Result, TaggerError};
use crate::transform::{NamedParameters, SequenceTransform};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => tanh(x),
            Activation::Sigmoid => sigmoid(x),
        }
    }
}

/// Position-wise affine projection `y[t] = act(x[t] · W + b)`.
#[derive(Debug, Clone)]
pub struct Dense {
    weight: Array2<f32>, // [in, out]
    bias: Array1<f32>,   // [out]
    activation: Activation,
}

impl Dense {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if bias.len() != weight.ncols() {
            return Err(TaggerError::mismatch(
                "Dense bias length",
                weight.ncols(),
                bias.len(),
            ));
        }
        Ok(Self {
            weight,
            bias,
            activation: Activation::Identity,
        })
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

impl SequenceTransform for Dense {
    fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        let mut out = input.dot(&self.weight) + &self.bias;
        if self.activation != Activation::Identity {
            let act = self.activation;
            out.mapv_inplace(|v| act.apply(v));
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        format!(
            "Dense({} -> {}, {:?})",
            self.input_dim(),
            self.output_dim(),
            self.activation
        )
    }

    fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        out.push((format!("{}.weight", prefix), self.weight.clone().into_dyn()));
        out.push((format!("{}.bias", prefix), self.bias.clone().into_dyn()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn affine_projection() {
        // W = [[1, 0.5], [0.5, 1], [0, 1]], b = [0.1, -0.1]
        let dense = Dense::new(
            arr2(&[[1.0f32, 0.5], [0.5, 1.0], [0.0, 1.0]]),
            arr1(&[0.1f32, -0.1]),
        )
        .unwrap();
        let out = dense.forward(arr2(&[[1.0f32, 1.0, 1.0], [0.0, 0.0, 0.0]]).view()).unwrap();
        let expected = arr2(&[[1.6f32, 2.4], [0.1, -0.1]]);
        for (a, e) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-6);
        }
    }

    #[test]
    fn relu_clips_negatives() {
        let dense = Dense::new(arr2(&[[1.0f32, -1.0]]), arr1(&[0.0f32, 0.0]))
            .unwrap()
            .with_activation(Activation::Relu);
        let out = dense.forward(arr2(&[[2.0f32]]).view()).unwrap();
        assert_eq!(out, arr2(&[[2.0f32, 0.0]]));
    }

    #[test]
    fn bias_length_checked() {
        assert!(Dense::new(Array2::zeros((3, 2)), Array1::zeros(3)).is_err());
    }

    #[test]
    fn empty_sequence() {
        let dense = Dense::new(Array2::zeros((3, 2)), Array1::zeros(2)).unwrap();
        let out = dense.forward(Array2::zeros((0, 3)).view()).unwrap();
        assert_eq!(out.dim(), (0, 2));
    }

    #[test]
    fn activation_names_parse() {
        let act: Activation = serde_json::from_str("\"tanh\"").unwrap();
        assert_eq!(act, Activation::Tanh);
    }
}

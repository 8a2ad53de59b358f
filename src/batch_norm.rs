use ndarray::{Array1, Array2, ArrayView2, Zip};

use crate::error::{Result, TaggerError};
use crate::transform::{NamedParameters, SequenceTransform};

/// Batch normalization in inference mode: normalizes each feature with
/// frozen running statistics, then applies a learned scale and shift.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    scale: Array1<f32>,
    bias: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    epsilon: f32,
}

impl BatchNorm {
    pub fn new(
        scale: Array1<f32>,
        bias: Array1<f32>,
        running_mean: Array1<f32>,
        running_var: Array1<f32>,
        epsilon: f32,
    ) -> Result<Self> {
        let dim = scale.len();
        for (name, len) in [
            ("bias", bias.len()),
            ("running_mean", running_mean.len()),
            ("running_var", running_var.len()),
        ] {
            if len != dim {
                return Err(TaggerError::mismatch(format!("BatchNorm {} length", name), dim, len));
            }
        }
        if running_var.iter().any(|&v| v < 0.0) {
            return Err(TaggerError::InvalidConfig(
                "BatchNorm running variance must be non-negative".to_string(),
            ));
        }
        Ok(Self {
            scale,
            bias,
            running_mean,
            running_var,
            epsilon,
        })
    }

    /// Unit scale, zero shift, zero mean, unit variance.
    pub fn identity(dim: usize, epsilon: f32) -> Self {
        Self {
            scale: Array1::ones(dim),
            bias: Array1::zeros(dim),
            running_mean: Array1::zeros(dim),
            running_var: Array1::ones(dim),
            epsilon,
        }
    }
}

impl SequenceTransform for BatchNorm {
    fn input_dim(&self) -> usize {
        self.scale.len()
    }

    fn output_dim(&self) -> usize {
        self.scale.len()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        // Fold the statistics into one multiplier and one offset per feature.
        let mut gain = Array1::<f32>::zeros(self.scale.len());
        let mut shift = Array1::<f32>::zeros(self.scale.len());
        Zip::from(&mut gain)
            .and(&mut shift)
            .and(&self.scale)
            .and(&self.bias)
            .and(&self.running_mean)
            .and(&self.running_var)
            .for_each(|g, s, &scale, &bias, &mean, &var| {
                *g = scale / (var + self.epsilon).sqrt();
                *s = bias - mean * *g;
            });
        Ok(&input * &gain + &shift)
    }

    fn describe(&self) -> String {
        format!("BatchNorm({})", self.scale.len())
    }

    fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        out.push((format!("{}.scale", prefix), self.scale.clone().into_dyn()));
        out.push((format!("{}.bias", prefix), self.bias.clone().into_dyn()));
        out.push((format!("{}.running_mean", prefix), self.running_mean.clone().into_dyn()));
        out.push((format!("{}.running_var", prefix), self.running_var.clone().into_dyn()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn identity_is_near_pass_through() {
        let bn = BatchNorm::identity(3, 1e-5);
        let x = arr2(&[[1.0f32, -2.0, 3.0], [0.5, 0.0, -0.5]]);
        let y = bn.forward(x.view()).unwrap();
        for (a, b) in y.iter().zip(x.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn uses_running_statistics() {
        let bn = BatchNorm::new(
            arr1(&[2.0f32, 1.0]),
            arr1(&[0.5f32, -1.0]),
            arr1(&[1.0f32, 10.0]),
            arr1(&[4.0f32, 0.25]),
            0.0,
        )
        .unwrap();
        let y = bn.forward(arr2(&[[3.0f32, 10.5]]).view()).unwrap();
        // (3 - 1) / 2 * 2 + 0.5 = 2.5 ; (10.5 - 10) / 0.5 * 1 - 1 = 0
        assert_abs_diff_eq!(y[[0, 0]], 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(y[[0, 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn rejects_mismatched_statistics() {
        let err = BatchNorm::new(
            Array1::ones(3),
            Array1::zeros(3),
            Array1::zeros(2),
            Array1::ones(3),
            1e-5,
        )
        .unwrap_err();
        assert!(err.to_string().contains("running_mean"));
    }

    #[test]
    fn rejects_negative_variance() {
        assert!(BatchNorm::new(
            Array1::ones(1),
            Array1::zeros(1),
            Array1::zeros(1),
            arr1(&[-1.0f32]),
            1e-5
        )
        .is_err());
    }
}

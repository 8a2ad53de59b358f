use libm::{expf, tanhf};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;

use crate::error::{Result, TaggerError};

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + expf(-x))
}

pub fn tanh(x: f32) -> f32 {
    tanhf(x)
}

/// Numerically stable log-softmax over each row.
pub fn log_softmax_rows(scores: ArrayView2<f32>) -> Array2<f32> {
    let mut out = scores.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max_val = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        // Shift before subtracting so large logits keep their precision.
        let ln_sum = row.iter().map(|&v| expf(v - max_val)).sum::<f32>().ln();
        row.mapv_inplace(|v| (v - max_val) - ln_sum);
    }
    out
}

pub fn argmax(row: ArrayView1<f32>) -> Result<usize> {
    row.argmax()
        .map_err(|e| TaggerError::Prediction(format!("argmax over scores failed: {}", e)))
}

/// Highest-scoring column for each row.
pub fn argmax_rows(scores: ArrayView2<f32>) -> Result<Vec<u32>> {
    scores
        .axis_iter(Axis(0))
        .map(|row| argmax(row).map(|i| i as u32))
        .collect()
}

pub fn filled(dim: usize, value: f32) -> Array1<f32> {
    Array1::from_elem(dim, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn sigmoid_is_centered() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-7);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }

    #[test]
    fn log_softmax_rows_normalize() {
        let scores = arr2(&[[1.0f32, 2.0, 3.0], [-1000.0, -1001.0, -1002.0]]);
        let out = log_softmax_rows(scores.view());
        for row in out.axis_iter(Axis(0)) {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
        // exp(3-3) / (e^-2 + e^-1 + 1)
        assert_abs_diff_eq!(out[[0, 2]].exp(), 0.66524096, epsilon = 1e-5);
        assert_abs_diff_eq!(out[[1, 0]].exp(), 0.66524096, epsilon = 1e-5);
    }

    #[test]
    fn log_softmax_keeps_precision_for_large_logits() {
        let scores = arr2(&[[5000.0f32, 4999.0, 4998.0], [-1000.0, -1001.0, -1002.0]]);
        let out = log_softmax_rows(scores.view());
        for row in out.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row[0], -0.40760596, epsilon = 1e-6);
            assert_abs_diff_eq!(row[1], -1.40760596, epsilon = 1e-6);
            assert_abs_diff_eq!(row[2], -2.40760596, epsilon = 1e-6);
        }
    }

    #[test]
    fn argmax_rows_picks_largest() {
        let scores = arr2(&[[0.1f32, 0.7, 0.2], [0.9, 0.05, 0.05]]);
        assert_eq!(argmax_rows(scores.view()).unwrap(), vec![1, 0]);
    }

    #[test]
    fn argmax_rejects_nan() {
        let row = arr1(&[0.1f32, f32::NAN]);
        assert!(matches!(argmax(row.view()), Err(TaggerError::Prediction(_))));
    }
}

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::common::{filled, sigmoid, tanh};
use crate::error::{Result, TaggerError};
use crate::transform::NamedParameters;

/// Per-direction recurrent state: hidden output and memory cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    pub hidden: Array1<f32>,
    pub memory: Array1<f32>,
}

impl CellState {
    pub fn filled(dim: usize, value: f32) -> Self {
        Self {
            hidden: filled(dim, value),
            memory: filled(dim, value),
        }
    }
}

/// One step of a recurrence: `(state, x[t]) -> (state', y[t])`.
///
/// `step` may assume `x.len() == input_dim()`; callers validate widths before
/// scanning.
pub trait RecurrentCell: std::fmt::Debug + Send + Sync {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
    fn state_dim(&self) -> usize;

    fn initial_state(&self, fill: f32) -> CellState {
        CellState::filled(self.state_dim(), fill)
    }

    fn step(&self, state: &CellState, x: ArrayView1<f32>) -> (CellState, Array1<f32>);

    fn export_parameters(&self, _prefix: &str, _out: &mut NamedParameters) {}
}

/// Standard LSTM without peepholes. Gates are packed along the last axis in
/// the order input, forget, candidate, output.
#[derive(Debug, Clone)]
pub struct LstmCell {
    input_dim: usize,
    hidden_dim: usize,
    w: Array2<f32>, // [input_dim, 4 * hidden_dim]
    u: Array2<f32>, // [hidden_dim, 4 * hidden_dim]
    b: Array1<f32>, // [4 * hidden_dim]
}

impl LstmCell {
    pub const GATES: usize = 4;

    pub fn new(w: Array2<f32>, u: Array2<f32>, b: Array1<f32>) -> Result<Self> {
        let (input_dim, packed) = w.dim();
        if packed == 0 || packed % Self::GATES != 0 {
            return Err(TaggerError::InvalidConfig(format!(
                "LSTM input weight has {} columns, expected a positive multiple of {}",
                packed,
                Self::GATES
            )));
        }
        let hidden_dim = packed / Self::GATES;
        if u.dim() != (hidden_dim, packed) {
            let (rows, cols) = u.dim();
            return Err(TaggerError::ParameterShape {
                name: "lstm.u".to_string(),
                expected: vec![hidden_dim, packed],
                actual: vec![rows, cols],
            });
        }
        if b.len() != packed {
            return Err(TaggerError::mismatch("LSTM bias length", packed, b.len()));
        }
        Ok(Self {
            input_dim,
            hidden_dim,
            w,
            u,
            b,
        })
    }

    pub fn parameter_shapes(
        input_dim: usize,
        hidden_dim: usize,
    ) -> [(&'static str, Vec<usize>); 3] {
        let packed = Self::GATES * hidden_dim;
        [
            ("w", vec![input_dim, packed]),
            ("u", vec![hidden_dim, packed]),
            ("b", vec![packed]),
        ]
    }
}

impl RecurrentCell for LstmCell {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.hidden_dim
    }

    fn state_dim(&self) -> usize {
        self.hidden_dim
    }

    fn step(&self, state: &CellState, x: ArrayView1<f32>) -> (CellState, Array1<f32>) {
        let h = self.hidden_dim;
        let z = x.dot(&self.w) + state.hidden.dot(&self.u) + &self.b;

        let input_gate = z.slice(s![0..h]).mapv(sigmoid);
        let forget_gate = z.slice(s![h..2 * h]).mapv(sigmoid);
        let candidate = z.slice(s![2 * h..3 * h]).mapv(tanh);
        let output_gate = z.slice(s![3 * h..]).mapv(sigmoid);

        let memory = &forget_gate * &state.memory + &input_gate * &candidate;
        let hidden = &output_gate * &memory.mapv(tanh);

        let output = hidden.clone();
        (CellState { hidden, memory }, output)
    }

    fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        out.push((format!("{}.w", prefix), self.w.clone().into_dyn()));
        out.push((format!("{}.u", prefix), self.u.clone().into_dyn()));
        out.push((format!("{}.b", prefix), self.b.clone().into_dyn()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn zero_cell(input_dim: usize, hidden_dim: usize) -> LstmCell {
        LstmCell::new(
            Array2::zeros((input_dim, 4 * hidden_dim)),
            Array2::zeros((hidden_dim, 4 * hidden_dim)),
            Array1::zeros(4 * hidden_dim),
        )
        .unwrap()
    }

    #[test]
    fn dims_follow_weights() {
        let cell = zero_cell(3, 5);
        assert_eq!(cell.input_dim(), 3);
        assert_eq!(cell.output_dim(), 5);
        assert_eq!(cell.state_dim(), 5);
        let state = cell.initial_state(0.1);
        assert_eq!(state.hidden.len(), 5);
        assert!(state.memory.iter().all(|&v| v == 0.1));
    }

    #[test]
    fn rejects_bad_packing() {
        let cell = |w: (usize, usize), u: (usize, usize), b: usize| {
            LstmCell::new(Array2::zeros(w), Array2::zeros(u), Array1::zeros(b))
        };
        assert!(cell((3, 7), (1, 7), 7).is_err());
        assert!(cell((3, 8), (3, 8), 8).is_err());
        assert!(cell((3, 8), (2, 8), 4).is_err());
    }

    #[test]
    fn zero_weights_step() {
        // All gates sit at sigmoid(0) = 0.5 and the candidate at tanh(0) = 0:
        // c' = 0.5 * c, h' = 0.5 * tanh(c').
        let cell = zero_cell(2, 1);
        let state = cell.initial_state(0.1);
        let (next, out) = cell.step(&state, arr1(&[1.0f32, -1.0]).view());
        assert_abs_diff_eq!(next.memory[0], 0.05, epsilon = 1e-7);
        assert_abs_diff_eq!(out[0], 0.5 * 0.05f32.tanh(), epsilon = 1e-7);
        assert_eq!(next.hidden, out);
    }

    #[test]
    fn input_gate_and_candidate_write_memory() {
        // One hidden unit, one input. Input gate and candidate driven by x,
        // forget gate closed, output gate open.
        let big = 50.0f32;
        let w = Array2::from_shape_vec((1, 4), vec![big, 0.0, 1.0, 0.0]).unwrap();
        let u = Array2::zeros((1, 4));
        let b = arr1(&[0.0f32, -big, 0.0, big]);
        let cell = LstmCell::new(w, u, b).unwrap();
        let (next, out) = cell.step(&cell.initial_state(0.0), arr1(&[1.0f32]).view());
        assert_abs_diff_eq!(next.memory[0], 1.0f32.tanh(), epsilon = 1e-5);
        assert_abs_diff_eq!(out[0], 1.0f32.tanh().tanh(), epsilon = 1e-5);
    }

    #[test]
    fn exports_named_parameters() {
        let cell = zero_cell(2, 3);
        let mut params = NamedParameters::new();
        cell.export_parameters("enc.fwd", &mut params);
        let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["enc.fwd.w", "enc.fwd.u", "enc.fwd.b"]);
        assert_eq!(params[0].1.shape(), &[2, 12]);
        for ((_, array), (_, shape)) in params.iter().zip(LstmCell::parameter_shapes(2, 3)) {
            assert_eq!(array.shape(), shape.as_slice());
        }
    }
}

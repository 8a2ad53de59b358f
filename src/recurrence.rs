//! Recurrent scans over a sequence, in one or both time directions.
//!
//! A [`Recurrence`] folds a [`RecurrentCell`] over the positions of its input
//! and emits one output row per position. A [`BiRecurrence`] runs two
//! independent recurrences, one forward and one backward, and splices their
//! outputs position by position:
//!
//! ```text
//! y[t] = concat(forward_scan(fwd, x)[t], backward_scan(bwd, x)[t])
//! ```
//!
//! The backward scan visits `t = n-1 .. 0` but writes each output back at its
//! original index `t`, so both halves of `y[t]` describe the same token.

use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::cell::RecurrentCell;
use crate::error::{Result, TaggerError};
use crate::transform::{NamedParameters, SequenceTransform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Constant every state dimension starts from unless a caller overrides it.
pub const DEFAULT_INITIAL_STATE: f32 = 0.1;

/// A single-direction scan of `cell` over a sequence. State is reset to
/// `initial_state` for every sequence; nothing is carried between calls.
#[derive(Debug, Clone)]
pub struct Recurrence<C> {
    cell: C,
    direction: Direction,
    initial_state: f32,
}

impl<C: RecurrentCell> Recurrence<C> {
    pub fn new(cell: C, direction: Direction) -> Self {
        Self {
            cell,
            direction,
            initial_state: DEFAULT_INITIAL_STATE,
        }
    }

    pub fn forward_scan(cell: C) -> Self {
        Self::new(cell, Direction::Forward)
    }

    pub fn backward_scan(cell: C) -> Self {
        Self::new(cell, Direction::Backward)
    }

    pub fn with_initial_state(mut self, value: f32) -> Self {
        self.initial_state = value;
        self
    }

    pub fn cell(&self) -> &C {
        &self.cell
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn initial_state(&self) -> f32 {
        self.initial_state
    }

    /// Runs the scan without re-validating the input width.
    fn scan(&self, input: ArrayView2<f32>) -> Array2<f32> {
        let len = input.nrows();
        let mut output = Array2::zeros((len, self.cell.output_dim()));
        let mut state = self.cell.initial_state(self.initial_state);

        let mut visit = |t: usize| {
            let (next, y) = self.cell.step(&state, input.row(t));
            output.row_mut(t).assign(&y);
            state = next;
        };
        match self.direction {
            Direction::Forward => (0..len).for_each(&mut visit),
            Direction::Backward => (0..len).rev().for_each(&mut visit),
        }
        output
    }
}

impl<C: RecurrentCell> SequenceTransform for Recurrence<C> {
    fn input_dim(&self) -> usize {
        self.cell.input_dim()
    }

    fn output_dim(&self) -> usize {
        self.cell.output_dim()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        Ok(self.scan(input))
    }

    fn describe(&self) -> String {
        let arrow = match self.direction {
            Direction::Forward => "fwd",
            Direction::Backward => "bwd",
        };
        format!(
            "Recurrence[{}]({} -> {})",
            arrow,
            self.cell.input_dim(),
            self.cell.output_dim()
        )
    }

    fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        self.cell.export_parameters(prefix, out);
    }
}

/// Forward and backward recurrences over the same input, spliced per position.
#[derive(Debug, Clone)]
pub struct BiRecurrence<F, B> {
    fwd: Recurrence<F>,
    bwd: Recurrence<B>,
}

impl<F: RecurrentCell, B: RecurrentCell> BiRecurrence<F, B> {
    /// Pairs two cells. Both must read the same input width.
    pub fn new(fwd: F, bwd: B) -> Result<Self> {
        if fwd.input_dim() != bwd.input_dim() {
            return Err(TaggerError::mismatch(
                "BiRecurrence backward cell input",
                fwd.input_dim(),
                bwd.input_dim(),
            ));
        }
        log::debug!(
            "bidirectional recurrence: {} -> {} + {}",
            fwd.input_dim(),
            fwd.output_dim(),
            bwd.output_dim()
        );
        Ok(Self {
            fwd: Recurrence::forward_scan(fwd),
            bwd: Recurrence::backward_scan(bwd),
        })
    }

    /// Checks that the spliced width equals `total`.
    pub fn with_output_dim(self, total: usize) -> Result<Self> {
        let actual = self.output_dim();
        if actual != total {
            return Err(TaggerError::mismatch(
                "BiRecurrence output width (forward + backward)",
                total,
                actual,
            ));
        }
        Ok(self)
    }

    /// Sets the initial state of both directions.
    pub fn with_initial_state(mut self, value: f32) -> Self {
        self.fwd.initial_state = value;
        self.bwd.initial_state = value;
        self
    }

    pub fn with_backward_initial_state(mut self, value: f32) -> Self {
        self.bwd.initial_state = value;
        self
    }

    pub fn forward_recurrence(&self) -> &Recurrence<F> {
        &self.fwd
    }

    pub fn backward_recurrence(&self) -> &Recurrence<B> {
        &self.bwd
    }
}

impl<F: RecurrentCell, B: RecurrentCell> SequenceTransform for BiRecurrence<F, B> {
    fn input_dim(&self) -> usize {
        self.fwd.input_dim()
    }

    fn output_dim(&self) -> usize {
        self.fwd.output_dim() + self.bwd.output_dim()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        if input.nrows() == 0 {
            return Ok(Array2::zeros((0, self.output_dim())));
        }
        let (forward_out, backward_out) =
            rayon::join(|| self.fwd.scan(input), || self.bwd.scan(input));
        Ok(concatenate(
            Axis(1),
            &[forward_out.view(), backward_out.view()],
        )?)
    }

    fn describe(&self) -> String {
        format!(
            "BiRecurrence({} -> {} + {})",
            self.input_dim(),
            self.fwd.output_dim(),
            self.bwd.output_dim()
        )
    }

    fn export_parameters(&self, prefix: &str, out: &mut NamedParameters) {
        self.fwd.export_parameters(&format!("{}.fwd", prefix), out);
        self.bwd.export_parameters(&format!("{}.bwd", prefix), out);
    }
}

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::Serialize;

use crate::common::{argmax_rows, log_softmax_rows};
use crate::ctf::AtisSample;
use crate::error::{Result, TaggerError};
use crate::model::SlotTagger;

fn check_labels(logits: ArrayView2<f32>, labels: &[u32]) -> Result<()> {
    if logits.nrows() != labels.len() {
        return Err(TaggerError::mismatch("label count", logits.nrows(), labels.len()));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l as usize >= logits.ncols()) {
        return Err(TaggerError::mismatch("label id bound", logits.ncols(), bad as usize));
    }
    Ok(())
}

/// Summed negative log-likelihood of `labels` under a softmax over each row.
pub fn cross_entropy_with_softmax(logits: ArrayView2<f32>, labels: &[u32]) -> Result<f32> {
    check_labels(logits, labels)?;
    let log_probs = log_softmax_rows(logits);
    Ok(labels
        .iter()
        .enumerate()
        .map(|(t, &label)| -log_probs[[t, label as usize]])
        .sum())
}

/// Number of positions whose arg-max differs from the label.
pub fn classification_errors(logits: ArrayView2<f32>, labels: &[u32]) -> Result<usize> {
    check_labels(logits, labels)?;
    let predicted = argmax_rows(logits)?;
    Ok(predicted
        .iter()
        .zip(labels)
        .filter(|(p, l)| p != l)
        .count())
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluationReport {
    pub sequences: usize,
    pub tokens: usize,
    pub errors: usize,
    pub loss: f64,
}

impl EvaluationReport {
    pub fn error_rate(&self) -> f64 {
        if self.tokens == 0 {
            0.0
        } else {
            self.errors as f64 / self.tokens as f64
        }
    }

    /// Cross entropy per token.
    pub fn mean_loss(&self) -> f64 {
        if self.tokens == 0 {
            0.0
        } else {
            self.loss / self.tokens as f64
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            sequences: self.sequences + other.sequences,
            tokens: self.tokens + other.tokens,
            errors: self.errors + other.errors,
            loss: self.loss + other.loss,
        }
    }
}

fn evaluate_one(model: &SlotTagger, sample: &AtisSample) -> Result<EvaluationReport> {
    if sample.tokens.len() != sample.labels.len() {
        return Err(TaggerError::mismatch(
            format!("labels of sequence {}", sample.id.as_deref().unwrap_or("<no id>")),
            sample.tokens.len(),
            sample.labels.len(),
        ));
    }
    let logits = model.logits(&sample.tokens)?;
    Ok(EvaluationReport {
        sequences: 1,
        tokens: sample.tokens.len(),
        errors: classification_errors(logits.view(), &sample.labels)?,
        loss: cross_entropy_with_softmax(logits.view(), &sample.labels)? as f64,
    })
}

/// Scores `model` on every sample, one sequence per rayon task.
pub fn evaluate(model: &SlotTagger, samples: &[AtisSample]) -> Result<EvaluationReport> {
    let report = samples
        .par_iter()
        .map(|sample| evaluate_one(model, sample))
        .try_reduce(EvaluationReport::default, |a, b| Ok(a.merge(b)))?;
    log::info!(
        "evaluated {} sequences ({} tokens): error rate {:.4}, mean loss {:.4}",
        report.sequences,
        report.tokens,
        report.error_rate(),
        report.mean_loss()
    );
    Ok(report)
}

//! Model capability interface and factory.
//!
//! The orchestrator only sees [`Model`]; concrete architectures are picked
//! by [`ModelKind`], parsed from the configured model identifier.

pub mod logistic;

pub use logistic::LogisticModel;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::ledger::Metrics;
use crate::params::ParameterSnapshot;

/// SGD hyper-parameters for one optimization step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SgdOptions {
    /// Learning rate
    pub lr: f32,
    /// Momentum factor (0 disables)
    pub momentum: f32,
    /// L2 weight decay
    pub weight_decay: f32,
}

impl SgdOptions {
    /// Plain SGD at `lr`.
    pub fn plain(lr: f32) -> Self {
        Self {
            lr,
            momentum: 0.0,
            weight_decay: 0.0,
        }
    }
}

/// Loss sum and correct count of one forward pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchStats {
    /// Cross-entropy summed over the batch
    pub loss: f64,
    /// Correct argmax predictions
    pub correct: u64,
}

impl BatchStats {
    /// Convert to ledger counters for a batch of `size` samples.
    pub fn into_metrics(self, size: usize) -> Metrics {
        Metrics::new(self.correct, self.loss, size as u64)
    }
}

/// Capabilities the core and the reference client need from a model.
pub trait Model: Send + Sync + fmt::Debug {
    /// Logits for a `(batch, features)` input.
    fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32>;

    /// Trainable parameters in their fixed name order.
    fn trainable_parameters(&self) -> ParameterSnapshot;

    /// Overwrite trainable parameters (layout must match) and reset optimizer state.
    fn load_parameters(&mut self, params: &ParameterSnapshot) -> Result<(), SimError>;

    /// Feature width the model expects.
    fn input_dim(&self) -> usize;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Fail if the model cannot be trained as configured.
    fn check_availability(&self) -> Result<(), SimError>;

    /// Reject a batch whose rows, width or labels do not fit the model.
    fn check_batch(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<(), SimError> {
        if x.nrows() != y.len() || x.ncols() != self.input_dim() {
            return Err(SimError::DimensionMismatch);
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= self.num_classes()) {
            return Err(SimError::ShapeError(format!(
                "label {} outside {} classes",
                bad,
                self.num_classes()
            )));
        }
        Ok(())
    }

    /// One mini-batch gradient step; returns the pre-step batch statistics.
    fn sgd_step(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        opt: &SgdOptions,
    ) -> Result<BatchStats, SimError>;

    /// Loss and accuracy on a batch without updating parameters.
    fn evaluate(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<BatchStats, SimError> {
        self.check_batch(x, y)?;
        let (stats, _) = softmax_cross_entropy(&self.forward(x), y)?;
        Ok(stats)
    }

    /// Deep copy behind a fresh box.
    fn box_clone(&self) -> Box<dyn Model>;
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Softmax cross-entropy statistics and the gradient w.r.t. the logits.
///
/// The gradient is averaged over the batch.
pub fn softmax_cross_entropy(
    logits: &Array2<f32>,
    y: &[usize],
) -> Result<(BatchStats, Array2<f32>), SimError> {
    if logits.nrows() != y.len() {
        return Err(SimError::DimensionMismatch);
    }
    if let Some(&bad) = y.iter().find(|&&label| label >= logits.ncols()) {
        return Err(SimError::ShapeError(format!(
            "label {} outside {} classes",
            bad,
            logits.ncols()
        )));
    }
    let n = logits.nrows().max(1) as f32;
    let mut grad = logits.clone();
    let mut stats = BatchStats::default();

    for (mut row, &label) in grad.axis_iter_mut(Axis(0)).zip(y.iter()) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);

        let predicted = row
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            })
            .0;
        if predicted == label {
            stats.correct += 1;
        }
        stats.loss -= (row[label].max(f32::MIN_POSITIVE) as f64).ln();

        row[label] -= 1.0;
        row.mapv_inplace(|v| v / n);
    }
    Ok((stats, grad))
}

/// Enumerated model identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Multinomial logistic regression
    Logistic,
}

impl ModelKind {
    /// Construct a freshly initialised model.
    pub fn build(&self, input_dim: usize, num_classes: usize, seed: u64) -> Box<dyn Model> {
        match self {
            ModelKind::Logistic => Box::new(LogisticModel::new(input_dim, num_classes, seed)),
        }
    }
}

impl FromStr for ModelKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logistic" | "lr" => Ok(ModelKind::Logistic),
            other => Err(SimError::InvalidConfig(format!(
                "Unknown model '{}'. Use 'logistic'",
                other
            ))),
        }
    }
}

//! Per-client evaluation counters.

use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Correct-prediction count, summed loss and sample count of one evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Number of correctly classified samples
    pub correct: u64,
    /// Loss summed over the evaluated samples
    pub loss: f64,
    /// Number of evaluated samples
    pub size: u64,
}

impl Metrics {
    /// Create a metrics record.
    pub fn new(correct: u64, loss: f64, size: u64) -> Self {
        Self {
            correct,
            loss,
            size,
        }
    }

    /// Accuracy in percent (`0.0` when no samples were evaluated).
    pub fn accuracy(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.correct as f64 / self.size as f64 * 100.0
        }
    }

    /// Loss per sample (`0.0` when no samples were evaluated).
    pub fn mean_loss(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.loss / self.size as f64
        }
    }
}

impl Add for Metrics {
    type Output = Metrics;

    fn add(self, rhs: Metrics) -> Metrics {
        Metrics {
            correct: self.correct + rhs.correct,
            loss: self.loss + rhs.loss,
            size: self.size + rhs.size,
        }
    }
}

impl Sum for Metrics {
    fn sum<I: Iterator<Item = Metrics>>(iter: I) -> Metrics {
        iter.fold(Metrics::default(), Add::add)
    }
}

impl<'a> Sum<&'a Metrics> for Metrics {
    fn sum<I: Iterator<Item = &'a Metrics>>(iter: I) -> Metrics {
        iter.copied().sum()
    }
}

/// Data subset an evaluation ran on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// The client's local train indices
    Train,
    /// The client's local test indices
    Test,
}

/// Whether an evaluation ran before or after local training.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// On the parameters the client received
    Before,
    /// On the parameters after local training
    After,
}

/// Train and test metrics of one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    /// Metrics on the train subset
    pub train: Metrics,
    /// Metrics on the test subset
    pub test: Metrics,
}

impl SplitMetrics {
    /// Metrics of one split.
    pub fn get(&self, split: Split) -> &Metrics {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }
}

/// Everything a client reports for one round of local training.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetrics {
    /// Evaluated on the received parameters
    pub before: SplitMetrics,
    /// Evaluated on the locally trained parameters
    pub after: SplitMetrics,
}

impl ClientMetrics {
    /// Metrics for a stage/split pair.
    pub fn get(&self, stage: Stage, split: Split) -> &Metrics {
        match stage {
            Stage::Before => self.before.get(split),
            Stage::After => self.after.get(split),
        }
    }
}

/// Test-set metrics before and after local adaptation (one test pass entry).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalStats {
    /// Test metrics on the received parameters
    pub before: Metrics,
    /// Test metrics after local fine-tuning
    pub after: Metrics,
}

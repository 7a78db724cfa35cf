//! Accuracy milestone ladder.
//!
//! Walks a run's per-round micro-averaged accuracy and reports the first
//! round that reaches each threshold of a descending ladder. Reporting a
//! threshold removes it and every higher one from the ladder, and a new
//! milestone also needs an accuracy strictly above the last reported one,
//! so each stream yields at most one milestone per threshold, in ascending
//! round order.

use serde::{Deserialize, Serialize};

use super::{MetricsLedger, Split, Stage};
use crate::error::SimError;
use crate::scheduler::SampleStream;

/// Thresholds (percent), highest first.
pub const ACCURACY_LADDER: [f64; 9] = [90.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0];

/// First round at which an accuracy threshold was reached.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Ladder threshold (percent)
    pub threshold: f64,
    /// Round index
    pub round: usize,
    /// Accuracy actually achieved at that round (percent)
    pub accuracy: f64,
}

/// Milestones of the four before/after × train/test accuracy streams.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    /// Train accuracy on received parameters
    pub train_before: Vec<Milestone>,
    /// Train accuracy after local training
    pub train_after: Vec<Milestone>,
    /// Test accuracy on received parameters
    pub test_before: Vec<Milestone>,
    /// Test accuracy after local training
    pub test_after: Vec<Milestone>,
}

impl ConvergenceReport {
    /// Milestones of one stream.
    pub fn stream(&self, stage: Stage, split: Split) -> &[Milestone] {
        match (split, stage) {
            (Split::Train, Stage::Before) => &self.train_before,
            (Split::Train, Stage::After) => &self.train_after,
            (Split::Test, Stage::Before) => &self.test_before,
            (Split::Test, Stage::After) => &self.test_after,
        }
    }
}

/// Run the ladder over a per-round accuracy sequence (percent).
///
/// For `[12, 35, 61, 59, 83]` this yields `10%@0, 30%@1, 60%@2, 80%@4`.
pub fn milestones<I>(accuracies: I) -> Vec<Milestone>
where
    I: IntoIterator<Item = f64>,
{
    let mut ladder: &[f64] = &ACCURACY_LADDER;
    let mut best = 0.0;
    let mut found = Vec::new();

    for (round, accuracy) in accuracies.into_iter().enumerate() {
        let hit = ladder
            .iter()
            .position(|&threshold| accuracy >= threshold && accuracy > best);
        if let Some(idx) = hit {
            found.push(Milestone {
                threshold: ladder[idx],
                round,
                accuracy,
            });
            best = accuracy;
            ladder = &ladder[..idx];
        }
    }
    found
}

impl MetricsLedger {
    /// Per-round micro-averaged accuracy over each round's selected clients.
    pub fn accuracy_series(
        &self,
        stream: &SampleStream,
        stage: Stage,
        split: Split,
    ) -> Result<Vec<f64>, SimError> {
        stream
            .iter()
            .map(|(round, clients)| self.accuracy(round, clients, stage, split))
            .collect()
    }

    /// Milestones for all four accuracy streams of a completed run.
    pub fn convergence_report(&self, stream: &SampleStream) -> Result<ConvergenceReport, SimError> {
        let ladder = |stage, split| -> Result<Vec<Milestone>, SimError> {
            Ok(milestones(self.accuracy_series(stream, stage, split)?))
        };
        Ok(ConvergenceReport {
            train_before: ladder(Stage::Before, Split::Train)?,
            train_after: ladder(Stage::After, Split::Train)?,
            test_before: ladder(Stage::Before, Split::Test)?,
            test_after: ladder(Stage::After, Split::Test)?,
        })
    }
}

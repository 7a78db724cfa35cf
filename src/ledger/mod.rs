//! Evaluation & metrics ledger.
//!
//! Every selected client reports before/after train/test counters once per
//! round. The ledger stores them append-only, keyed by `(client, round)`,
//! and derives sample-weighted (micro-averaged) accuracies from them:
//!
//! ```text
//! acc = Σ correct_i / Σ size_i        (not mean of per-client accuracies)
//! ```
//!
//! - [`metrics`] - counter types reported by client trainers
//! - [`convergence`] - accuracy milestone ladder over a whole run

pub mod convergence;
pub mod metrics;

pub use convergence::{milestones, ConvergenceReport, Milestone, ACCURACY_LADDER};
pub use metrics::{ClientMetrics, EvalStats, Metrics, Split, SplitMetrics, Stage};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::ClientId;

/// Micro-averaged accuracies (percent) of one round's selected clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Train accuracy on the received parameters
    pub train_acc_before: f64,
    /// Train accuracy after local training
    pub train_acc_after: f64,
    /// Test accuracy on the received parameters
    pub test_acc_before: f64,
    /// Test accuracy after local training
    pub test_acc_after: f64,
}

impl RoundSummary {
    /// The per-client line persisted with `save_allstats`.
    pub fn describe(&self) -> String {
        format!(
            "acc (train): {:.2}% -> {:.2}%, acc (test): {:.2}% -> {:.2}%",
            self.train_acc_before, self.train_acc_after, self.test_acc_before, self.test_acc_after
        )
    }
}

/// Formatted result of one full test pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    /// `"before -> after"` mean loss
    pub loss: String,
    /// `"before% -> after%"` micro-averaged accuracy
    pub accuracy: String,
}

impl TestSummary {
    /// Summarize per-client test statistics, micro-averaged over clients.
    pub fn from_stats(stats: &[EvalStats]) -> Self {
        let before: Metrics = stats.iter().map(|s| &s.before).sum();
        let after: Metrics = stats.iter().map(|s| &s.after).sum();
        Self {
            loss: format!("{:.4} -> {:.4}", before.mean_loss(), after.mean_loss()),
            accuracy: format!("{:.2}% -> {:.2}%", before.accuracy(), after.accuracy()),
        }
    }
}

/// Append-only per-client, per-round metrics store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsLedger {
    entries: BTreeMap<ClientId, BTreeMap<usize, ClientMetrics>>,
}

impl MetricsLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client's metrics for a round.
    ///
    /// Each `(client, round)` key is written at most once; a second write
    /// fails with [`SimError::DuplicateRecord`] and leaves the first intact.
    pub fn record(
        &mut self,
        client: ClientId,
        round: usize,
        metrics: ClientMetrics,
    ) -> Result<(), SimError> {
        let rounds = self.entries.entry(client).or_default();
        if rounds.contains_key(&round) {
            return Err(SimError::DuplicateRecord { client, round });
        }
        rounds.insert(round, metrics);
        Ok(())
    }

    /// Metrics of a client at a round.
    pub fn get(&self, client: ClientId, round: usize) -> Option<&ClientMetrics> {
        self.entries.get(&client).and_then(|r| r.get(&round))
    }

    /// Total number of recorded `(client, round)` entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed counters of `clients` at `round` for one stage/split.
    pub fn total(
        &self,
        round: usize,
        clients: &[ClientId],
        stage: Stage,
        split: Split,
    ) -> Result<Metrics, SimError> {
        clients
            .iter()
            .map(|&client| {
                self.get(client, round)
                    .map(|m| *m.get(stage, split))
                    .ok_or(SimError::MissingRecord { client, round })
            })
            .sum()
    }

    /// Micro-averaged accuracy of `clients` at `round` for one stage/split.
    pub fn accuracy(
        &self,
        round: usize,
        clients: &[ClientId],
        stage: Stage,
        split: Split,
    ) -> Result<f64, SimError> {
        Ok(self.total(round, clients, stage, split)?.accuracy())
    }

    /// Micro-averaged before/after train/test accuracies of one round.
    pub fn summarize_round(
        &self,
        round: usize,
        clients: &[ClientId],
    ) -> Result<RoundSummary, SimError> {
        Ok(RoundSummary {
            train_acc_before: self.accuracy(round, clients, Stage::Before, Split::Train)?,
            train_acc_after: self.accuracy(round, clients, Stage::After, Split::Train)?,
            test_acc_before: self.accuracy(round, clients, Stage::Before, Split::Test)?,
            test_acc_after: self.accuracy(round, clients, Stage::After, Split::Test)?,
        })
    }
}

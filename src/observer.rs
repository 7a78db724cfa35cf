//! Round lifecycle hooks.

use crate::ledger::{RoundSummary, TestSummary};
use crate::ClientId;

/// Receives round events from the orchestrator.
///
/// All methods default to no-ops. Observers run on the orchestrator thread
/// between rounds and never see partially aggregated state.
pub trait RoundObserver: Send {
    /// Called before the selected clients of `round` are trained.
    fn on_round_start(&mut self, round: usize, selected: &[ClientId]) {
        let _ = (round, selected);
    }

    /// Called after a test pass; `round` is the test-results key.
    fn on_test(&mut self, round: usize, summary: &TestSummary) {
        let _ = (round, summary);
    }

    /// Called after `round` has been aggregated and recorded.
    fn on_round_end(&mut self, round: usize, summary: &RoundSummary) {
        let _ = (round, summary);
    }
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl RoundObserver for NoopObserver {}

/// Observer that forwards events to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl RoundObserver for TracingObserver {
    fn on_round_start(&mut self, round: usize, selected: &[ClientId]) {
        tracing::debug!(round, ?selected, "Round started");
    }

    fn on_test(&mut self, round: usize, summary: &TestSummary) {
        tracing::debug!(
            round,
            loss = %summary.loss,
            accuracy = %summary.accuracy,
            "Test pass"
        );
    }

    fn on_round_end(&mut self, round: usize, summary: &RoundSummary) {
        tracing::debug!(
            round,
            train_acc_before = summary.train_acc_before,
            train_acc_after = summary.train_acc_after,
            test_acc_before = summary.test_acc_before,
            test_acc_after = summary.test_acc_after,
            "Round finished"
        );
    }
}

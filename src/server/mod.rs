//! Round-based orchestrator.
//!
//! A [`Server`] owns everything a run mutates: the parameter store, the
//! precomputed sample stream, the aggregator, the metrics ledger and the
//! transcript. A run moves through
//!
//! ```text
//! CONSTRUCTED -> (PRETRAINING)? -> TESTING -> {ROUND}* -> CONVERGENCE_REPORT -> (PERSIST)? -> DONE
//! ```
//!
//! Each round trains every selected client against the same pre-round
//! snapshot (sequentially in sorted id order, or on the rayon pool when
//! `parallel_clients` is set), then aggregates once. The next round only
//! starts after aggregation has finished.

mod persist;
mod pretrain;

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregators::{AuditLog, DeltaAggregator};
use crate::client::{ClientTrainer, LocalUpdate};
use crate::config::RunConfig;
use crate::data::Dataset;
use crate::error::SimError;
use crate::ledger::{
    ConvergenceReport, EvalStats, Milestone, MetricsLedger, RoundSummary, Split, Stage,
    TestSummary,
};
use crate::logging::Transcript;
use crate::model::Model;
use crate::observer::{NoopObserver, RoundObserver};
use crate::params::{ParamMode, ParameterSnapshot, ParameterStore};
use crate::partition::{ExperimentContext, SplitPolicy};
use crate::scheduler::SampleStream;
use crate::ClientId;

/// Per-client, per-round formatted accuracy strings.
pub type AllStats = BTreeMap<ClientId, BTreeMap<usize, String>>;

/// Everything a completed run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Test pass summaries keyed by `0` (before training) and `E + 1`
    pub test_results: BTreeMap<usize, TestSummary>,
    /// Accuracy milestones of the four metric streams
    pub convergence: ConvergenceReport,
    /// One entry per aggregated round
    pub audit: AuditLog,
    /// Every client's metrics of every round it was selected in
    pub ledger: MetricsLedger,
    /// Formatted per-client accuracy strings (filled with `save_allstats`)
    pub allstats: AllStats,
    /// Global parameters after the last round
    pub final_global: ParameterSnapshot,
    /// Per-client parameters after the last round (empty in shared mode)
    pub client_params: BTreeMap<ClientId, ParameterSnapshot>,
}

/// Federated simulation orchestrator.
pub struct Server<T: ClientTrainer> {
    ctx: ExperimentContext,
    model: Box<dyn Model>,
    trainer: T,
    store: ParameterStore,
    stream: SampleStream,
    aggregator: DeltaAggregator,
    ledger: MetricsLedger,
    test_results: BTreeMap<usize, TestSummary>,
    allstats: AllStats,
    transcript: Transcript,
    observer: Box<dyn RoundObserver>,
    pretrain_data: Option<Arc<dyn Dataset>>,
}

impl<T: ClientTrainer> Server<T> {
    /// Build the initial parameter state and the sample stream.
    ///
    /// # Arguments
    ///
    /// * `algo` - Algorithm name used in the transcript and output file names
    /// * `ctx` - Configuration and partition of the experiment
    /// * `mode` - Shared global model or per-client models
    /// * `model` - Model whose parameters seed the run (used for pretraining)
    /// * `trainer` - Local training collaborator, bound to its own model copy
    pub fn new(
        algo: impl Into<String>,
        mut ctx: ExperimentContext,
        mode: ParamMode,
        model: Box<dyn Model>,
        trainer: T,
    ) -> Result<Self, SimError> {
        ctx.config.algo = algo.into();
        ctx.config.validate()?;
        ctx.partition.validate()?;
        model.check_availability()?;

        let config = &ctx.config;
        let stream = SampleStream::generate(
            ctx.partition.train_clients(),
            config.join_ratio,
            config.global_epoch,
            config.seed,
        )?;
        let store = ParameterStore::new(
            mode,
            model.trainable_parameters(),
            ctx.partition.train_clients(),
        );

        let mut transcript = Transcript::new(config.log);
        transcript.line(format!(
            "{} ALGORITHM: {} {}",
            "=".repeat(20),
            config.algo,
            "=".repeat(20)
        ));
        transcript.line(format!(
            "Experiment Arguments: {}",
            serde_json::to_string(config)?
        ));

        Ok(Self {
            ctx,
            model,
            trainer,
            store,
            stream,
            aggregator: DeltaAggregator::new(),
            ledger: MetricsLedger::new(),
            test_results: BTreeMap::new(),
            allstats: AllStats::new(),
            transcript,
            observer: Box::new(NoopObserver),
            pretrain_data: None,
        })
    }

    /// Replace the round observer.
    pub fn with_observer(mut self, observer: impl RoundObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Dataset the pretrain pool indices refer to.
    pub fn with_pretrain_data(mut self, dataset: Arc<dyn Dataset>) -> Self {
        self.pretrain_data = Some(dataset);
        self
    }

    /// Run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.ctx.config
    }

    /// Precomputed client selections.
    pub fn sample_stream(&self) -> &SampleStream {
        &self.stream
    }

    /// Current parameter state.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Run pretraining, the initial test, every round, the convergence
    /// report and persistence.
    pub fn run(mut self) -> Result<RunReport, SimError> {
        if self.ctx.config.visible {
            tracing::info!("Live visualization requested; no sink is bundled, skipping");
        }
        if self.ctx.config.pretrain_epoch > 0 {
            self.pretrain()?;
        }

        self.test(0)?;
        self.train()?;

        let results = serde_json::to_string(&self.test_results)?;
        self.transcript.line(format!(
            "{} {} TEST RESULTS: {} {}",
            "=".repeat(20),
            self.ctx.config.algo,
            "=".repeat(20),
            results
        ));

        let convergence = self.ledger.convergence_report(&self.stream)?;
        self.log_convergence(&convergence);
        self.persist()?;

        Ok(RunReport {
            test_results: self.test_results,
            convergence,
            audit: self.aggregator.audit().clone(),
            ledger: self.ledger,
            allstats: self.allstats,
            final_global: self.store.global().clone(),
            client_params: self
                .store
                .client_table()
                .map(|(client, params)| (client, params.clone()))
                .collect(),
        })
    }

    fn train(&mut self) -> Result<(), SimError> {
        let config = self.ctx.config.clone();
        for round in 0..config.global_epoch {
            let verbose = (round + 1) % config.verbose_gap == 0;
            if verbose {
                self.transcript.line(format!(
                    "{} TRAINING EPOCH: {} {}",
                    "-".repeat(26),
                    round + 1,
                    "-".repeat(26)
                ));
            }
            if (round + 1) % config.test_gap == 0 {
                self.test(round + 1)?;
            }

            let selected = self
                .stream
                .round(round)
                .ok_or_else(|| {
                    SimError::InvalidConfig(format!("no selection for round {}", round))
                })?
                .to_vec();
            self.observer.on_round_start(round, &selected);

            let updates = self.train_clients(&selected, verbose)?;
            self.aggregate_round(round, &selected, updates)?;

            let summary = self.log_info(round, &selected)?;
            self.observer.on_round_end(round, &summary);
        }
        Ok(())
    }

    /// Train each selected client against its pre-round snapshot.
    ///
    /// Results come back in `selected` order whether or not the calls ran
    /// in parallel.
    fn train_clients(
        &self,
        selected: &[ClientId],
        verbose: bool,
    ) -> Result<Vec<LocalUpdate>, SimError> {
        let store = &self.store;
        let trainer = &self.trainer;
        let train_one = |&client: &ClientId| {
            let params = store.snapshot_for(client);
            trainer.train(client, &params, verbose)
        };
        if self.ctx.config.parallel_clients {
            selected.par_iter().map(train_one).collect()
        } else {
            selected.iter().map(train_one).collect()
        }
    }

    fn aggregate_round(
        &mut self,
        round: usize,
        selected: &[ClientId],
        updates: Vec<LocalUpdate>,
    ) -> Result<(), SimError> {
        let personalized = self.store.mode() == ParamMode::Personalized;
        let mut deltas = Vec::with_capacity(updates.len());
        let mut weights = Vec::with_capacity(updates.len());
        let mut metrics = Vec::with_capacity(updates.len());
        let mut local_params = Vec::new();

        for (&client, update) in selected.iter().zip(updates) {
            deltas.push(update.delta);
            weights.push(update.weight);
            metrics.push(update.metrics);
            if personalized {
                local_params.push(
                    update
                        .local_params
                        .ok_or(SimError::MissingLocalParameters { client })?,
                );
            }
        }

        self.aggregator
            .aggregate(round, self.store.global_mut(), &deltas, &weights)?;
        if personalized {
            self.store.apply_client_updates(selected, local_params)?;
        }
        for (&client, entry) in selected.iter().zip(metrics) {
            self.ledger.record(client, round, entry)?;
        }
        Ok(())
    }

    /// Full test pass over the test clients, stored under `key`.
    fn test(&mut self, key: usize) -> Result<(), SimError> {
        let store = &self.store;
        let trainer = &self.trainer;
        let test_one = |&client: &ClientId| {
            let params = store.snapshot_for(client);
            trainer.test(client, &params)
        };
        let clients = self.ctx.partition.test_clients();
        let stats: Vec<EvalStats> = if self.ctx.config.parallel_clients {
            clients.par_iter().map(test_one).collect::<Result<_, _>>()?
        } else {
            clients.iter().map(test_one).collect::<Result<_, _>>()?
        };

        let summary = TestSummary::from_stats(&stats);
        tracing::debug!(key, loss = %summary.loss, accuracy = %summary.accuracy, "Test pass");
        self.observer.on_test(key, &summary);
        self.test_results.insert(key, summary);
        Ok(())
    }

    /// Micro-averaged accuracies of a finished round.
    ///
    /// Test accuracy stays at zero under a user split, where train clients
    /// hold no test data.
    fn log_info(
        &mut self,
        round: usize,
        selected: &[ClientId],
    ) -> Result<RoundSummary, SimError> {
        let config = &self.ctx.config;
        let ledger = &self.ledger;
        let mut summary = RoundSummary::default();

        if config.eval_test && self.ctx.dataset_args.split != SplitPolicy::User {
            summary.test_acc_before = ledger.accuracy(round, selected, Stage::Before, Split::Test)?;
            summary.test_acc_after = ledger.accuracy(round, selected, Stage::After, Split::Test)?;
        }
        if config.eval_train {
            summary.train_acc_before =
                ledger.accuracy(round, selected, Stage::Before, Split::Train)?;
            summary.train_acc_after = ledger.accuracy(round, selected, Stage::After, Split::Train)?;
        }
        tracing::info!(
            round,
            train_acc_before = summary.train_acc_before,
            train_acc_after = summary.train_acc_after,
            test_acc_before = summary.test_acc_before,
            test_acc_after = summary.test_acc_after,
            "Round {} finished",
            round + 1
        );

        if config.save_allstats {
            let line = summary.describe();
            for &client in selected {
                self.allstats
                    .entry(client)
                    .or_default()
                    .insert(round, line.clone());
            }
        }
        Ok(summary)
    }

    fn log_convergence(&mut self, report: &ConvergenceReport) {
        let algo = self.ctx.config.algo.clone();
        let sections = [
            ("Convergence on train data:", Split::Train),
            ("Convergence on test data:", Split::Test),
        ];
        for (title, split) in sections {
            self.transcript.line(title);
            for (label, stage) in [("before", Stage::Before), ("after", Stage::After)] {
                self.transcript.line(format!("Accuracy ({}):", label));
                for Milestone {
                    threshold,
                    round,
                    accuracy,
                } in report.stream(stage, split)
                {
                    self.transcript.line(format!(
                        "{} achieved {}%({:.2}%) at epoch: {}",
                        algo, threshold, accuracy, round
                    ));
                }
            }
        }
    }
}

//! # fedsim: round-based federated learning simulation
//!
//! fedsim drives simulated federated learning runs: a server repeatedly
//! samples train clients, hands them a shared (or per-client) parameter
//! snapshot, lets each client optimize locally and folds the returned
//! deltas back into the global parameters.
//!
//! ## Building Blocks
//!
//! - [`SampleStream`] - Every round's client selection, drawn up front from one seed
//! - [`ParameterStore`] - Global snapshot plus the optional per-client table
//! - [`DeltaAggregator`] - Sample-weighted delta aggregation with an audit log
//! - [`MetricsLedger`] - Append-only before/after metrics and convergence milestones
//! - [`Server`] - The orchestrator tying them together
//!
//! Local optimization is a collaborator behind [`ClientTrainer`];
//! [`SgdClient`] is a reference implementation over any [`Model`] and
//! [`Dataset`].
//!
//! ## Delta Convention
//!
//! A client's delta is `start - end`. The aggregator subtracts the weighted
//! sum of deltas from the global parameters.

#![deny(missing_docs)]

pub mod aggregators;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod observer;
pub mod params;
pub mod partition;
pub mod scheduler;
pub mod server;

/// Identifier of a simulated client, in `[0, client_num_in_total)`.
pub type ClientId = usize;

// Re-exports
pub use aggregators::{AggregationAuditEntry, AuditLog, DeltaAggregator};
pub use client::{ClientTrainer, LocalUpdate, SgdClient};
pub use config::RunConfig;
pub use data::{Dataset, InMemoryDataset};
pub use error::SimError;
pub use ledger::{ClientMetrics, EvalStats, Metrics, MetricsLedger, RoundSummary, TestSummary};
pub use model::{Model, ModelKind};
pub use observer::{NoopObserver, RoundObserver, TracingObserver};
pub use params::{ParamMode, ParameterSnapshot, ParameterStore};
pub use partition::{DatasetArgs, ExperimentContext, Partition, SplitPolicy};
pub use scheduler::SampleStream;
pub use server::{RunReport, Server};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Client trainer contract.
//!
//! The orchestrator hands a client id and a parameter snapshot to a
//! [`ClientTrainer`] and gets back a [`LocalUpdate`]. Deltas follow one
//! convention across the whole crate:
//!
//! ```text
//! delta = start - end
//! ```
//!
//! where `start` is the snapshot the client received and `end` the snapshot
//! after local training. The aggregator subtracts the weighted sum of deltas.

pub mod sgd;

pub use sgd::{LocalOptions, SgdClient};

use crate::error::SimError;
use crate::ledger::{ClientMetrics, EvalStats};
use crate::params::ParameterSnapshot;
use crate::ClientId;

/// Result of one client's local training in one round.
#[derive(Clone, Debug)]
pub struct LocalUpdate {
    /// `start - end` in the received snapshot's layout
    pub delta: ParameterSnapshot,
    /// Number of local train samples behind the delta
    pub weight: u64,
    /// Before/after train/test counters
    pub metrics: ClientMetrics,
    /// Locally trained parameters; required in personalized mode
    pub local_params: Option<ParameterSnapshot>,
}

/// Local optimization collaborator.
///
/// Methods take `&self` so the clients of one round may be trained
/// concurrently; each call works on its own copy of the model.
pub trait ClientTrainer: Send + Sync {
    /// Train `client` locally starting from `params`.
    fn train(
        &self,
        client: ClientId,
        params: &ParameterSnapshot,
        verbose: bool,
    ) -> Result<LocalUpdate, SimError>;

    /// Evaluate `client`'s test data before and after local adaptation.
    fn test(&self, client: ClientId, params: &ParameterSnapshot) -> Result<EvalStats, SimError>;
}

//! Per-round aggregation records.
//!
//! Each aggregated round leaves one [`AggregationAuditEntry`] keyed by its
//! round index. A round can be recorded once; the sum of recorded weights
//! must match the sample counts behind the sample stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What one aggregation combined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationAuditEntry {
    /// Round index
    pub round: usize,
    /// Clients whose deltas went into the step
    pub n_clients: usize,
    /// Summed local sample counts of those clients
    pub total_weight: u64,
    /// L2 norm of the step subtracted from the global parameters
    pub step_norm: f32,
}

/// Aggregation records keyed by round.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    rounds: BTreeMap<usize, AggregationAuditEntry>,
}

impl AuditLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `round` already has an entry.
    pub fn contains(&self, round: usize) -> bool {
        self.rounds.contains_key(&round)
    }

    /// Record `entry` under its round. Returns `false` and keeps the
    /// existing entry when the round was already recorded.
    pub fn insert(&mut self, entry: AggregationAuditEntry) -> bool {
        if self.contains(entry.round) {
            return false;
        }
        self.rounds.insert(entry.round, entry);
        true
    }

    /// Entry of `round`, if that round was aggregated.
    pub fn round(&self, round: usize) -> Option<&AggregationAuditEntry> {
        self.rounds.get(&round)
    }

    /// Entries in round order.
    pub fn iter(&self) -> impl Iterator<Item = &AggregationAuditEntry> {
        self.rounds.values()
    }

    /// Sample weight aggregated over all recorded rounds.
    pub fn total_weight(&self) -> u64 {
        self.rounds.values().map(|e| e.total_weight).sum()
    }

    /// Number of recorded rounds.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// Whether no round has been recorded.
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

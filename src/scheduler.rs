//! Client sampling stream.
//!
//! The whole sequence of per-round client sets is drawn before round 0 from
//! a dedicated seeded RNG. Nothing an algorithm does during a round can
//! shift the draws of later rounds, so every algorithm run with the same
//! seed and configuration sees the same selection trajectory.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::ClientId;

/// Number of clients drawn per round: `round(n * join_ratio)`, at least one.
pub fn clients_per_round(n_train_clients: usize, join_ratio: f64) -> usize {
    let k = (n_train_clients as f64 * join_ratio).round() as usize;
    k.clamp(1, n_train_clients.max(1))
}

/// Precomputed, immutable per-round client selections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStream {
    rounds: Vec<Vec<ClientId>>,
}

impl SampleStream {
    /// Draw `num_rounds` sorted subsets of `train_clients` without replacement.
    ///
    /// # Arguments
    ///
    /// * `train_clients` - Universe of trainable client ids
    /// * `join_ratio` - Fraction of train clients per round, in (0, 1]
    /// * `num_rounds` - Number of communication rounds
    /// * `seed` - Seed of the sampling RNG
    pub fn generate(
        train_clients: &[ClientId],
        join_ratio: f64,
        num_rounds: usize,
        seed: u64,
    ) -> Result<Self, SimError> {
        if train_clients.is_empty() {
            return Err(SimError::InvalidConfig(
                "no train clients to sample from".to_string(),
            ));
        }
        if !(join_ratio > 0.0 && join_ratio <= 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "join_ratio {} must be in (0, 1]",
                join_ratio
            )));
        }

        let k = clients_per_round(train_clients.len(), join_ratio);
        let mut rng = StdRng::seed_from_u64(seed);
        let rounds = (0..num_rounds)
            .map(|_| {
                let mut selected: Vec<ClientId> =
                    train_clients.choose_multiple(&mut rng, k).copied().collect();
                selected.sort_unstable();
                selected
            })
            .collect();

        Ok(Self { rounds })
    }

    /// Build a stream from explicit selections (each is sorted on the way in).
    pub fn from_rounds(rounds: Vec<Vec<ClientId>>) -> Self {
        let rounds = rounds
            .into_iter()
            .map(|mut r| {
                r.sort_unstable();
                r
            })
            .collect();
        Self { rounds }
    }

    /// Clients selected for `round`.
    pub fn round(&self, round: usize) -> Option<&[ClientId]> {
        self.rounds.get(round).map(Vec::as_slice)
    }

    /// Number of rounds in the stream.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// Whether the stream holds no rounds.
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Iterate over `(round, selected)` in round order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[ClientId])> {
        self.rounds.iter().map(Vec::as_slice).enumerate()
    }
}

//! Sample-weighted FedAvg in delta space.
//!
//! Client deltas are `start - end` (the reduction direction). The weighted
//! sum of deltas is the aggregated step, and the global parameters move by
//! subtracting it. This is the standard weighted local-update average of
//! McMahan et al. (2017) written in terms of deltas.

use ndarray::ArrayD;
use rayon::prelude::*;

use crate::error::SimError;
use crate::params::ParameterSnapshot;

/// Normalize sample counts into convex weights summing to 1.
///
/// Fails with [`SimError::ZeroAggregationWeight`] if the counts sum to zero.
pub fn normalized_weights(weights: &[u64]) -> Result<Vec<f32>, SimError> {
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return Err(SimError::ZeroAggregationWeight);
    }
    Ok(weights
        .iter()
        .map(|&w| (w as f64 / total as f64) as f32)
        .collect())
}

/// Weighted sum `Σ w_i * delta_i` with `w_i = weight_i / Σ weight_j`.
///
/// Every parameter tensor is reduced independently (in parallel); within a
/// tensor clients are accumulated in input order, so the result does not
/// depend on thread scheduling.
///
/// # Arguments
///
/// * `deltas` - One delta snapshot per client, all with the same layout
/// * `weights` - Local sample count behind each delta
pub fn weighted_delta(
    deltas: &[ParameterSnapshot],
    weights: &[u64],
) -> Result<ParameterSnapshot, SimError> {
    if deltas.is_empty() {
        return Err(SimError::EmptyUpdates);
    }
    if weights.len() != deltas.len() {
        return Err(SimError::DimensionMismatch);
    }

    let reference = &deltas[0];
    for delta in &deltas[1..] {
        reference.ensure_compatible(delta)?;
    }

    let norm = normalized_weights(weights)?;

    let values: Vec<ArrayD<f32>> = (0..reference.len())
        .into_par_iter()
        .map(|idx| {
            let mut acc = ArrayD::<f32>::zeros(reference.values()[idx].raw_dim());
            for (delta, &w) in deltas.iter().zip(norm.iter()) {
                acc.scaled_add(w, &delta.values()[idx]);
            }
            acc
        })
        .collect();

    ParameterSnapshot::new(reference.names().to_vec(), values)
}

//! Round aggregation for federated learning.
//!
//! [`DeltaAggregator`] combines one round's client deltas into a single
//! step, weighted by client sample counts, and applies it to the global
//! parameters:
//!
//! ```text
//! w_i    = weight_i / Σ weight_j
//! global = global - Σ w_i * delta_i        (delta_i = start_i - end_i)
//! ```

pub mod audit;
pub mod fedavg;

pub use audit::{AggregationAuditEntry, AuditLog};
pub use fedavg::{normalized_weights, weighted_delta};

use crate::error::SimError;
use crate::params::ParameterSnapshot;

/// Applies weighted delta aggregation and keeps an audit trail.
///
/// # Example
///
/// ```rust
/// use fedsim::aggregators::DeltaAggregator;
/// use fedsim::ParameterSnapshot;
/// use ndarray::arr1;
///
/// let snap = |v: f32| {
///     ParameterSnapshot::new(vec!["w".to_string()], vec![arr1(&[v]).into_dyn()]).unwrap()
/// };
///
/// let mut global = snap(1.0);
/// let mut agg = DeltaAggregator::new();
///
/// // Two clients moved w by -0.2 and -0.6; the second holds 3x the samples.
/// agg.aggregate(0, &mut global, &[snap(0.2), snap(0.6)], &[10, 30]).unwrap();
/// assert!((global.get("w").unwrap()[[0]] - 0.5).abs() < 1e-6);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DeltaAggregator {
    audit: AuditLog,
}

impl DeltaAggregator {
    /// Create an aggregator with an empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subtract the weighted sum of `deltas` from `global` in place.
    ///
    /// # Arguments
    ///
    /// * `round` - Round index, recorded in the audit log
    /// * `global` - Global parameters to update
    /// * `deltas` - Client deltas (`start - end`), all with `global`'s layout
    /// * `weights` - Local sample count behind each delta
    ///
    /// A round that was already aggregated is rejected before `global` is
    /// touched.
    pub fn aggregate(
        &mut self,
        round: usize,
        global: &mut ParameterSnapshot,
        deltas: &[ParameterSnapshot],
        weights: &[u64],
    ) -> Result<(), SimError> {
        if self.audit.contains(round) {
            return Err(SimError::RoundAlreadyAggregated(round));
        }
        let step = weighted_delta(deltas, weights)?;
        global.sub_assign(&step)?;

        let entry = AggregationAuditEntry {
            round,
            n_clients: deltas.len(),
            total_weight: weights.iter().sum(),
            step_norm: step.l2_norm(),
        };
        tracing::debug!(
            round,
            n_clients = entry.n_clients,
            total_weight = entry.total_weight,
            step_norm = entry.step_norm,
            "Aggregated round deltas"
        );
        self.audit.insert(entry);
        Ok(())
    }

    /// Audit trail of every aggregation performed so far.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn snap(values: &[f32]) -> ParameterSnapshot {
        ParameterSnapshot::new(vec!["w".to_string()], vec![arr1(values).into_dyn()]).unwrap()
    }

    #[test]
    fn test_aggregate_subtracts_weighted_delta() {
        let mut global = snap(&[1.0, 1.0]);
        let mut agg = DeltaAggregator::new();

        agg.aggregate(0, &mut global, &[snap(&[1.0, 0.0]), snap(&[0.0, 1.0])], &[1, 1])
            .unwrap();

        assert!((global.get("w").unwrap()[[0]] - 0.5).abs() < 1e-6);
        assert!((global.get("w").unwrap()[[1]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_audit_records_total_weight() {
        let mut global = snap(&[0.0]);
        let mut agg = DeltaAggregator::new();

        agg.aggregate(0, &mut global, &[snap(&[1.0]), snap(&[1.0])], &[8, 50])
            .unwrap();
        agg.aggregate(1, &mut global, &[snap(&[2.0])], &[5]).unwrap();

        assert_eq!(agg.audit().len(), 2);
        assert_eq!(agg.audit().round(0).unwrap().total_weight, 58);
        assert_eq!(agg.audit().round(0).unwrap().n_clients, 2);
        assert!((agg.audit().round(1).unwrap().step_norm - 2.0).abs() < 1e-6);
        assert!((global.get("w").unwrap()[[0]] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_aggregation_leaves_global_untouched() {
        let mut global = snap(&[1.0]);
        let mut agg = DeltaAggregator::new();
        assert!(agg.aggregate(0, &mut global, &[snap(&[1.0])], &[0]).is_err());
        assert_eq!(global, snap(&[1.0]));
        assert!(agg.audit().is_empty());
    }

    #[test]
    fn test_round_is_aggregated_once() {
        let mut global = snap(&[1.0]);
        let mut agg = DeltaAggregator::new();
        agg.aggregate(4, &mut global, &[snap(&[0.5])], &[10]).unwrap();

        let again = agg.aggregate(4, &mut global, &[snap(&[0.5])], &[10]);
        assert!(matches!(again, Err(SimError::RoundAlreadyAggregated(4))));
        assert_eq!(global, snap(&[0.5]));
        assert_eq!(agg.audit().len(), 1);
        assert_eq!(agg.audit().total_weight(), 10);
    }
}

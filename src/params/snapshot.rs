//! Ordered parameter snapshot.

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Ordered mapping from parameter name to tensor.
///
/// The name order is fixed when the snapshot is built from a model and is
/// part of the snapshot's identity: two snapshots are compatible only when
/// they list the same names, in the same order, with the same shapes.
/// Deltas, global parameters and per-client parameters all share one layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    names: Vec<String>,
    values: Vec<ArrayD<f32>>,
}

impl ParameterSnapshot {
    /// Build a snapshot from parallel name/value lists.
    ///
    /// Fails with [`SimError::DimensionMismatch`] on a length mismatch and with
    /// [`SimError::InvalidConfig`] on duplicate names.
    pub fn new(names: Vec<String>, values: Vec<ArrayD<f32>>) -> Result<Self, SimError> {
        if names.len() != values.len() {
            return Err(SimError::DimensionMismatch);
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(SimError::InvalidConfig(format!(
                    "duplicate parameter name '{}'",
                    name
                )));
            }
        }
        Ok(Self { names, values })
    }

    /// Build from lists the caller guarantees to be parallel and unique.
    pub(crate) fn from_ordered(names: Vec<String>, values: Vec<ArrayD<f32>>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// A snapshot with the same layout and all values zero.
    pub fn zeros_like(&self) -> Self {
        Self {
            names: self.names.clone(),
            values: self
                .values
                .iter()
                .map(|v| ArrayD::zeros(v.raw_dim()))
                .collect(),
        }
    }

    /// Parameter names in their fixed order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Tensors in name order.
    pub fn values(&self) -> &[ArrayD<f32>] {
        &self.values
    }

    /// Mutable tensors in name order.
    pub fn values_mut(&mut self) -> &mut [ArrayD<f32>] {
        &mut self.values
    }

    /// Look up a tensor by name.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.position(name).map(|i| &self.values[i])
    }

    /// Iterate over `(name, tensor)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Number of named tensors.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the snapshot has no tensors.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Total number of scalar parameters.
    pub fn num_elements(&self) -> usize {
        self.values.iter().map(|v| v.len()).sum()
    }

    /// Same names, same order, same shapes.
    pub fn is_compatible(&self, other: &ParameterSnapshot) -> bool {
        self.names == other.names
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.shape() == b.shape())
    }

    /// Fail with [`SimError::DimensionMismatch`] unless `other` has this layout.
    pub fn ensure_compatible(&self, other: &ParameterSnapshot) -> Result<(), SimError> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(SimError::DimensionMismatch)
        }
    }

    /// `self - other`, tensor by tensor.
    ///
    /// With `self` the parameters a client started from and `other` the
    /// parameters it ended with, this is the update delta handed to the
    /// aggregator.
    pub fn sub(&self, other: &ParameterSnapshot) -> Result<ParameterSnapshot, SimError> {
        self.ensure_compatible(other)?;
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a - b)
            .collect();
        Ok(Self {
            names: self.names.clone(),
            values,
        })
    }

    /// Subtract `step` in place (`self -= step`).
    pub fn sub_assign(&mut self, step: &ParameterSnapshot) -> Result<(), SimError> {
        self.ensure_compatible(step)?;
        for (param, diff) in self.values.iter_mut().zip(step.values.iter()) {
            Zip::from(param).and(diff).for_each(|p, &d| *p -= d);
        }
        Ok(())
    }

    /// L2 norm over every scalar of every tensor.
    pub fn l2_norm(&self) -> f32 {
        self.values
            .iter()
            .flat_map(|v| v.iter())
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt()
    }

    /// Whether every value is finite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.iter().all(|x| x.is_finite()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

//! Sample access for local training and pretraining.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SimError;

/// Indexed labelled samples.
pub trait Dataset: Send + Sync {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature dimension of every sample.
    fn num_features(&self) -> usize;

    /// Number of label classes.
    fn num_classes(&self) -> usize;

    /// Gather the samples at `indices` into a feature matrix and label list.
    fn batch(&self, indices: &[usize]) -> Result<(Array2<f32>, Vec<usize>), SimError>;
}

/// Split `indices` into consecutive mini-batches of at most `batch_size`.
pub fn batches(indices: &[usize], batch_size: usize) -> impl Iterator<Item = &[usize]> {
    indices.chunks(batch_size.max(1))
}

/// Dataset held fully in memory.
#[derive(Clone, Debug)]
pub struct InMemoryDataset {
    features: Array2<f32>,
    labels: Vec<usize>,
    num_classes: usize,
}

impl InMemoryDataset {
    /// Wrap a `(n_samples, n_features)` matrix and its labels.
    pub fn new(
        features: Array2<f32>,
        labels: Vec<usize>,
        num_classes: usize,
    ) -> Result<Self, SimError> {
        if features.nrows() != labels.len() {
            return Err(SimError::ShapeError(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&y| y >= num_classes) {
            return Err(SimError::ShapeError(format!(
                "label {} outside {} classes",
                bad, num_classes
            )));
        }
        Ok(Self {
            features,
            labels,
            num_classes,
        })
    }

    /// Seeded synthetic classification data: one noisy blob per class.
    ///
    /// Sample `i` belongs to class `i % n_classes`, so classes are balanced.
    pub fn synthetic_blobs(
        n_samples: usize,
        n_features: usize,
        n_classes: usize,
        spread: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_classes = n_classes.max(1);
        let centers =
            Array2::<f32>::from_shape_fn((n_classes, n_features), |_| rng.gen_range(-2.0..2.0));
        let labels: Vec<usize> = (0..n_samples).map(|i| i % n_classes).collect();
        let spread = spread.abs().max(f32::EPSILON);
        let features = Array2::from_shape_fn((n_samples, n_features), |(i, j)| {
            centers[[labels[i], j]] + rng.gen_range(-spread..spread)
        });
        Self {
            features,
            labels,
            num_classes: n_classes,
        }
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn num_features(&self) -> usize {
        self.features.ncols()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn batch(&self, indices: &[usize]) -> Result<(Array2<f32>, Vec<usize>), SimError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.labels.len()) {
            return Err(SimError::ShapeError(format!(
                "sample index {} out of range for {} samples",
                bad,
                self.labels.len()
            )));
        }
        let x = self.features.select(Axis(0), indices);
        let y = indices.iter().map(|&i| self.labels[i]).collect();
        Ok((x, y))
    }
}

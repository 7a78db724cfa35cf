//! Multinomial logistic regression.

use ndarray::{Array1, Array2, ArrayView2, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{softmax_cross_entropy, BatchStats, Model, SgdOptions};
use crate::error::SimError;
use crate::params::ParameterSnapshot;

const WEIGHT: &str = "fc.weight";
const BIAS: &str = "fc.bias";

/// `logits = x · Wᵀ + b` with `W: (classes, features)`.
#[derive(Clone, Debug)]
pub struct LogisticModel {
    weight: Array2<f32>,
    bias: Array1<f32>,
    weight_velocity: Array2<f32>,
    bias_velocity: Array1<f32>,
}

impl LogisticModel {
    /// Uniform `±1/sqrt(input_dim)` weights from a seeded RNG, zero bias.
    pub fn new(input_dim: usize, num_classes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (input_dim.max(1) as f32).sqrt();
        let weight =
            Array2::from_shape_fn((num_classes, input_dim), |_| rng.gen_range(-bound..=bound));
        Self {
            weight_velocity: Array2::zeros(weight.raw_dim()),
            bias_velocity: Array1::zeros(num_classes),
            bias: Array1::zeros(num_classes),
            weight,
        }
    }
}

impl Model for LogisticModel {
    fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }

    fn trainable_parameters(&self) -> ParameterSnapshot {
        ParameterSnapshot::from_ordered(
            vec![WEIGHT.to_string(), BIAS.to_string()],
            vec![self.weight.clone().into_dyn(), self.bias.clone().into_dyn()],
        )
    }

    fn load_parameters(&mut self, params: &ParameterSnapshot) -> Result<(), SimError> {
        let weight = params
            .get(WEIGHT)
            .ok_or_else(|| SimError::UnknownParameter(WEIGHT.to_string()))?
            .clone()
            .into_dimensionality::<Ix2>()?;
        let bias = params
            .get(BIAS)
            .ok_or_else(|| SimError::UnknownParameter(BIAS.to_string()))?
            .clone()
            .into_dimensionality::<Ix1>()?;
        if weight.dim() != self.weight.dim() || bias.dim() != self.bias.dim() {
            return Err(SimError::DimensionMismatch);
        }
        self.weight = weight;
        self.bias = bias;
        self.weight_velocity.fill(0.0);
        self.bias_velocity.fill(0.0);
        Ok(())
    }

    fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn num_classes(&self) -> usize {
        self.weight.nrows()
    }

    fn check_availability(&self) -> Result<(), SimError> {
        if self.num_classes() < 2 || self.input_dim() == 0 {
            return Err(SimError::InvalidConfig(format!(
                "logistic model needs >= 2 classes and >= 1 feature, got {}x{}",
                self.num_classes(),
                self.input_dim()
            )));
        }
        if !self.trainable_parameters().is_finite() {
            return Err(SimError::InvalidConfig(
                "model parameters are not finite".to_string(),
            ));
        }
        Ok(())
    }

    fn sgd_step(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        opt: &SgdOptions,
    ) -> Result<BatchStats, SimError> {
        self.check_batch(x, y)?;
        let (stats, grad_logits) = softmax_cross_entropy(&self.forward(x), y)?;

        let mut grad_w = grad_logits.t().dot(&x);
        let mut grad_b = grad_logits.sum_axis(Axis(0));
        if opt.weight_decay != 0.0 {
            grad_w.scaled_add(opt.weight_decay, &self.weight);
            grad_b.scaled_add(opt.weight_decay, &self.bias);
        }

        if opt.momentum != 0.0 {
            self.weight_velocity.mapv_inplace(|v| v * opt.momentum);
            self.weight_velocity += &grad_w;
            self.bias_velocity.mapv_inplace(|v| v * opt.momentum);
            self.bias_velocity += &grad_b;
            self.weight.scaled_add(-opt.lr, &self.weight_velocity);
            self.bias.scaled_add(-opt.lr, &self.bias_velocity);
        } else {
            self.weight.scaled_add(-opt.lr, &grad_w);
            self.bias.scaled_add(-opt.lr, &grad_b);
        }
        Ok(stats)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

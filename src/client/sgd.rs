//! Reference client: local mini-batch SGD on the client's partition.

use std::sync::Arc;

use super::{ClientTrainer, LocalUpdate};
use crate::config::RunConfig;
use crate::data::{batches, Dataset};
use crate::error::SimError;
use crate::ledger::{ClientMetrics, EvalStats, Metrics, SplitMetrics};
use crate::model::{Model, SgdOptions};
use crate::params::ParameterSnapshot;
use crate::partition::{DataIndices, Partition};
use crate::ClientId;

/// Local training knobs taken from the run configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalOptions {
    /// Epochs of local training per round
    pub local_epoch: usize,
    /// Epochs of local fine-tuning in test passes
    pub finetune_epoch: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Optimizer settings
    pub sgd: SgdOptions,
    /// Evaluate the train subset
    pub eval_train: bool,
    /// Evaluate the test subset
    pub eval_test: bool,
}

impl From<&RunConfig> for LocalOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            local_epoch: config.local_epoch,
            finetune_epoch: config.finetune_epoch,
            batch_size: config.batch_size,
            sgd: SgdOptions {
                lr: config.local_lr,
                momentum: config.momentum,
                weight_decay: config.weight_decay,
            },
            eval_train: config.eval_train,
            eval_test: config.eval_test,
        }
    }
}

/// Trains a private deep copy of the model on each client's indices.
pub struct SgdClient {
    model: Box<dyn Model>,
    dataset: Arc<dyn Dataset>,
    data_indices: Vec<DataIndices>,
    options: LocalOptions,
}

impl SgdClient {
    /// Bind a copy of `model` to `dataset` and the partition's client indices.
    pub fn new(
        model: &dyn Model,
        dataset: Arc<dyn Dataset>,
        partition: &Partition,
        options: LocalOptions,
    ) -> Self {
        Self {
            model: model.box_clone(),
            dataset,
            data_indices: partition.data_indices.clone(),
            options,
        }
    }

    fn indices(&self, client: ClientId) -> Result<&DataIndices, SimError> {
        self.data_indices
            .get(client)
            .ok_or_else(|| SimError::Trainer(format!("client {} has no data indices", client)))
    }

    fn model_from(&self, params: &ParameterSnapshot) -> Result<Box<dyn Model>, SimError> {
        let mut model = self.model.box_clone();
        model.load_parameters(params)?;
        Ok(model)
    }

    fn fit(&self, model: &mut dyn Model, indices: &[usize], epochs: usize) -> Result<(), SimError> {
        for _ in 0..epochs {
            for batch in batches(indices, self.options.batch_size) {
                let (x, y) = self.dataset.batch(batch)?;
                model.sgd_step(x.view(), &y, &self.options.sgd)?;
            }
        }
        Ok(())
    }

    fn measure(&self, model: &dyn Model, indices: &[usize]) -> Result<Metrics, SimError> {
        let mut total = Metrics::default();
        for batch in batches(indices, self.options.batch_size) {
            let (x, y) = self.dataset.batch(batch)?;
            total = total + model.evaluate(x.view(), &y)?.into_metrics(batch.len());
        }
        Ok(total)
    }

    fn measure_splits(
        &self,
        model: &dyn Model,
        indices: &DataIndices,
    ) -> Result<SplitMetrics, SimError> {
        let mut split = SplitMetrics::default();
        if self.options.eval_train {
            split.train = self.measure(model, &indices.train)?;
        }
        if self.options.eval_test {
            split.test = self.measure(model, &indices.test)?;
        }
        Ok(split)
    }
}

impl ClientTrainer for SgdClient {
    fn train(
        &self,
        client: ClientId,
        params: &ParameterSnapshot,
        verbose: bool,
    ) -> Result<LocalUpdate, SimError> {
        let indices = self.indices(client)?;
        let mut model = self.model_from(params)?;

        let before = self.measure_splits(model.as_ref(), indices)?;
        self.fit(model.as_mut(), &indices.train, self.options.local_epoch)?;
        let after = self.measure_splits(model.as_ref(), indices)?;

        if verbose {
            tracing::info!(
                client,
                loss_before = before.train.mean_loss(),
                loss_after = after.train.mean_loss(),
                acc_before = before.train.accuracy(),
                acc_after = after.train.accuracy(),
                "Local training finished"
            );
        }

        let end = model.trainable_parameters();
        Ok(LocalUpdate {
            delta: params.sub(&end)?,
            weight: indices.train.len() as u64,
            metrics: ClientMetrics { before, after },
            local_params: Some(end),
        })
    }

    fn test(&self, client: ClientId, params: &ParameterSnapshot) -> Result<EvalStats, SimError> {
        let indices = self.indices(client)?;
        let mut model = self.model_from(params)?;

        let before = self.measure(model.as_ref(), &indices.test)?;
        if self.options.finetune_epoch == 0 {
            return Ok(EvalStats {
                before,
                after: before,
            });
        }
        self.fit(model.as_mut(), &indices.train, self.options.finetune_epoch)?;
        let after = self.measure(model.as_ref(), &indices.test)?;
        Ok(EvalStats { before, after })
    }
}

//! Centralized warm start on the pretrain pool.

use super::Server;
use crate::client::ClientTrainer;
use crate::data::batches;
use crate::error::SimError;
use crate::model::SgdOptions;

impl<T: ClientTrainer> Server<T> {
    /// Train the server model on the pretrain pool, then re-seed the store.
    ///
    /// Batches of one sample or fewer are skipped. Per-epoch accuracy and
    /// loss are divided by the whole pool size, skipped samples included.
    pub(super) fn pretrain(&mut self) -> Result<(), SimError> {
        let dataset = self
            .pretrain_data
            .clone()
            .ok_or(SimError::MissingPretrainData)?;
        let pool = self
            .ctx
            .partition
            .data_indices_pretrain
            .as_ref()
            .ok_or(SimError::MissingPretrainData)?
            .train
            .clone();

        let config = self.ctx.config.clone();
        let opt = SgdOptions {
            lr: config.pretrain_lr,
            momentum: config.momentum,
            weight_decay: config.weight_decay,
        };
        let denom = pool.len().max(1) as f64;

        for epoch in 0..config.pretrain_epoch {
            if (epoch + 1) % config.verbose_gap == 0 {
                self.transcript.line(format!(
                    "{} PRETRAINING EPOCH: {} {}",
                    "-".repeat(26),
                    epoch + 1,
                    "-".repeat(26)
                ));
            }

            let mut correct = 0u64;
            let mut loss = 0.0f64;
            let mut skipped = 0usize;
            for batch in batches(&pool, config.batch_size) {
                if batch.len() <= 1 {
                    skipped += 1;
                    continue;
                }
                let (x, y) = dataset.batch(batch)?;
                let stats = self.model.sgd_step(x.view(), &y, &opt)?;
                correct += stats.correct;
                loss += stats.loss;
            }

            tracing::info!(
                epoch,
                accuracy = correct as f64 / denom,
                loss = loss / denom,
                skipped_batches = skipped,
                "Pretraining epoch finished"
            );
        }

        self.store.replace_global(self.model.trainable_parameters());
        Ok(())
    }
}

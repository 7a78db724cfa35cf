//! Output files of a finished run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use super::Server;
use crate::client::ClientTrainer;
use crate::error::SimError;
use crate::params::{ParamMode, ParameterSnapshot};
use crate::ClientId;

fn write_json<V: Serialize + ?Sized>(path: &Path, value: &V) -> Result<(), SimError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

impl<T: ClientTrainer> Server<T> {
    /// Write the transcript, the allstats ledger and the final model(s),
    /// each gated by its configuration flag.
    pub(super) fn persist(&self) -> Result<(), SimError> {
        let config = &self.ctx.config;
        let log_dir = config.log_dir.join(&config.dataset);

        if config.log {
            let path = log_dir.join(format!("{}.log", config.algo));
            self.transcript.save(&path)?;
            tracing::info!(path = %path.display(), "Saved transcript");
        }
        if config.save_allstats {
            let path = log_dir.join(format!("{}_allstats.json", config.algo));
            write_json(&path, &self.allstats)?;
            tracing::info!(path = %path.display(), "Saved per-client stats");
        }
        if config.save_model {
            let path = config.model_dir.join(config.model_file_name());
            match self.store.mode() {
                ParamMode::Shared => write_json(&path, self.store.global())?,
                ParamMode::Personalized => {
                    let table: BTreeMap<ClientId, &ParameterSnapshot> =
                        self.store.client_table().collect();
                    write_json(&path, &table)?;
                }
            }
            tracing::info!(path = %path.display(), "Saved model parameters");
        }
        Ok(())
    }
}

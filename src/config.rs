//! Run configuration.
//!
//! [`RunConfig`] is layered with the `config` crate: built-in defaults,
//! then an optional file (TOML/JSON/YAML by extension), then `FEDSIM_*`
//! environment variables (e.g. `FEDSIM_JOIN_RATIO=0.2`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Configuration surface of a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Algorithm name used in logs and output file names
    pub algo: String,
    /// Dataset name; also the directory under `data_root` holding the partition
    pub dataset: String,
    /// Model identifier (see [`ModelKind`](crate::model::ModelKind))
    pub model: String,
    /// Seed of every RNG owned by the run
    pub seed: u64,
    /// Expected size of the client universe; checked against the partition when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_num_in_total: Option<usize>,
    /// Fraction of train clients sampled per round
    pub join_ratio: f64,
    /// Number of communication rounds
    pub global_epoch: usize,
    /// Local epochs per client per round
    pub local_epoch: usize,
    /// Local fine-tuning epochs before the after-adaptation test measurement
    pub finetune_epoch: usize,
    /// Local learning rate
    pub local_lr: f32,
    /// Mini-batch size for local training and pretraining
    pub batch_size: usize,
    /// SGD momentum
    pub momentum: f32,
    /// L2 weight decay
    pub weight_decay: f32,
    /// Centralized warm-start epochs (0 disables pretraining)
    pub pretrain_epoch: usize,
    /// Pretraining learning rate
    pub pretrain_lr: f32,
    /// Run a full test pass every `test_gap` rounds
    pub test_gap: usize,
    /// Emit verbose round headers every `verbose_gap` rounds
    pub verbose_gap: usize,
    /// Evaluate on each client's train subset
    pub eval_train: bool,
    /// Evaluate on each client's test subset
    pub eval_test: bool,
    /// Persist per-client per-round accuracy strings
    pub save_allstats: bool,
    /// Persist the final model(s)
    pub save_model: bool,
    /// Keep and persist a transcript of status lines
    pub log: bool,
    /// Request live visualization (no sink is bundled)
    pub visible: bool,
    /// Train the clients of a round on the rayon pool
    pub parallel_clients: bool,
    /// Root directory holding `<dataset>/partition.json` and `<dataset>/args.json`
    pub data_root: PathBuf,
    /// Output directory for transcripts and stats
    pub log_dir: PathBuf,
    /// Output directory for saved models
    pub model_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            algo: "FedAvg".to_string(),
            dataset: "synthetic".to_string(),
            model: "logistic".to_string(),
            seed: 42,
            client_num_in_total: None,
            join_ratio: 0.1,
            global_epoch: 100,
            local_epoch: 5,
            finetune_epoch: 0,
            local_lr: 0.01,
            batch_size: 32,
            momentum: 0.0,
            weight_decay: 0.0,
            pretrain_epoch: 0,
            pretrain_lr: 0.01,
            test_gap: 100,
            verbose_gap: 100_000,
            eval_train: true,
            eval_test: true,
            save_allstats: false,
            save_model: false,
            log: false,
            visible: false,
            parallel_clients: false,
            data_root: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl RunConfig {
    /// Load defaults, then `path` (if any), then `FEDSIM_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SimError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&RunConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FEDSIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: RunConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.join_ratio > 0.0 && self.join_ratio <= 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "join_ratio {} must be in (0, 1]",
                self.join_ratio
            )));
        }
        let positive = [
            ("global_epoch", self.global_epoch),
            ("test_gap", self.test_gap),
            ("verbose_gap", self.verbose_gap),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SimError::InvalidConfig(format!("{} must be >= 1", name)));
            }
        }
        if self.pretrain_epoch > 0 && self.pretrain_lr <= 0.0 {
            return Err(SimError::InvalidConfig(
                "pretrain_lr must be positive when pretraining".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding this dataset's partition and args files.
    pub fn dataset_dir(&self) -> PathBuf {
        self.data_root.join(&self.dataset)
    }

    /// Deterministic saved-model file name: `{algo}_{dataset}_{rounds}_{model}.json`.
    pub fn model_file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.json",
            self.algo, self.dataset, self.global_epoch, self.model
        )
    }
}

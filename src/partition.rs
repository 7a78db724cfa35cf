//! Client/data partition produced by the offline partitioning step.
//!
//! Read from `<data_root>/<dataset>/partition.json`:
//!
//! ```json
//! {
//!   "separation": { "train": [0, 1], "test": [2], "total": 3 },
//!   "data_indices": [ {"train": [0, 4], "test": []}, ... ],
//!   "data_indices_pretrain": { "train": [...], "test": [...] }
//! }
//! ```
//!
//! plus the partitioning arguments in `<data_root>/<dataset>/args.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::SimError;
use crate::ClientId;

/// Which clients train and which are evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Separation {
    /// Clients that take part in rounds
    pub train: Vec<ClientId>,
    /// Clients evaluated by test passes
    pub test: Vec<ClientId>,
    /// Size of the client universe
    pub total: usize,
}

/// Sample indices of one client (or of the pretrain pool).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIndices {
    /// Local train sample indices
    #[serde(default)]
    pub train: Vec<usize>,
    /// Local test sample indices
    #[serde(default)]
    pub test: Vec<usize>,
}

/// Immutable per-experiment client/data assignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Train/test client designation
    pub separation: Separation,
    /// Indexed by client id
    pub data_indices: Vec<DataIndices>,
    /// Held-out centralized pool used by pretraining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_indices_pretrain: Option<DataIndices>,
}

impl Partition {
    /// Read and validate `<dir>/partition.json`.
    ///
    /// A missing file is reported as [`SimError::PartitionNotFound`].
    pub fn load(dir: &Path, dataset: &str) -> Result<Self, SimError> {
        let path = dir.join("partition.json");
        let text = fs::read_to_string(&path).map_err(|_| SimError::PartitionNotFound {
            dataset: dataset.to_string(),
            path: path.clone(),
        })?;
        let partition: Partition = serde_json::from_str(&text)?;
        partition.validate()?;
        Ok(partition)
    }

    /// Check that every designated client exists and has an index entry.
    pub fn validate(&self) -> Result<(), SimError> {
        let sep = &self.separation;
        if sep.train.is_empty() {
            return Err(SimError::InvalidConfig(
                "partition has no train clients".to_string(),
            ));
        }
        for &client in sep.train.iter().chain(sep.test.iter()) {
            if client >= sep.total {
                return Err(SimError::InvalidConfig(format!(
                    "client {} outside universe of {}",
                    client, sep.total
                )));
            }
            if client >= self.data_indices.len() {
                return Err(SimError::InvalidConfig(format!(
                    "client {} has no data indices",
                    client
                )));
            }
        }
        Ok(())
    }

    /// Indices of one client.
    pub fn indices(&self, client: ClientId) -> Option<&DataIndices> {
        self.data_indices.get(client)
    }

    /// Train client ids.
    pub fn train_clients(&self) -> &[ClientId] {
        &self.separation.train
    }

    /// Test client ids.
    pub fn test_clients(&self) -> &[ClientId] {
        &self.separation.test
    }
}

/// How the partitioning step split data into train and test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Every client holds both train and test samples; train and test clients coincide
    #[default]
    Sample,
    /// Disjoint train clients (train samples only) and test clients (test samples only)
    User,
}

/// Arguments the dataset was partitioned with (`args.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetArgs {
    /// Split policy
    #[serde(default)]
    pub split: SplitPolicy,
    /// Remaining partitioning arguments, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DatasetArgs {
    /// Read `<dir>/args.json`; a missing file yields the defaults (`sample` split).
    pub fn load(dir: &Path) -> Result<Self, SimError> {
        let path = dir.join("args.json");
        if !path.exists() {
            tracing::info!(path = %path.display(), "No dataset args file, assuming sample split");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Everything a run reads before its first round, owned in one place.
#[derive(Clone, Debug)]
pub struct ExperimentContext {
    /// Run configuration
    pub config: RunConfig,
    /// Client/data assignment
    pub partition: Partition,
    /// Partitioning arguments
    pub dataset_args: DatasetArgs,
}

impl ExperimentContext {
    /// Assemble a context from in-memory parts (validated).
    pub fn new(
        config: RunConfig,
        partition: Partition,
        dataset_args: DatasetArgs,
    ) -> Result<Self, SimError> {
        config.validate()?;
        partition.validate()?;
        if let Some(total) = config.client_num_in_total {
            if total != partition.separation.total {
                return Err(SimError::InvalidConfig(format!(
                    "client_num_in_total {} does not match partition total {}",
                    total, partition.separation.total
                )));
            }
        }
        if dataset_args.split == SplitPolicy::User {
            let overlap = partition
                .train_clients()
                .iter()
                .any(|c| partition.test_clients().contains(c));
            if overlap {
                return Err(SimError::InvalidConfig(
                    "user split requires disjoint train and test clients".to_string(),
                ));
            }
        }
        if config.pretrain_epoch > 0 && partition.data_indices_pretrain.is_none() {
            return Err(SimError::MissingPretrainData);
        }
        Ok(Self {
            config,
            partition,
            dataset_args,
        })
    }

    /// Read partition and dataset args from `config.dataset_dir()`.
    pub fn load(config: RunConfig) -> Result<Self, SimError> {
        let dir = config.dataset_dir();
        let partition = Partition::load(&dir, &config.dataset)?;
        let dataset_args = DatasetArgs::load(&dir)?;
        Self::new(config, partition, dataset_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> Partition {
        Partition {
            separation: Separation {
                train: vec![0, 1],
                test: vec![2],
                total: 3,
            },
            data_indices: vec![
                DataIndices {
                    train: vec![0, 1],
                    test: vec![],
                },
                DataIndices {
                    train: vec![2, 3],
                    test: vec![],
                },
                DataIndices {
                    train: vec![],
                    test: vec![4, 5],
                },
            ],
            data_indices_pretrain: None,
        }
    }

    #[test]
    fn test_missing_partition_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = Partition::load(dir.path(), "cifar10");
        assert!(matches!(result, Err(SimError::PartitionNotFound { .. })));
    }

    #[test]
    fn test_load_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("partition.json"),
            serde_json::to_string(&partition()).unwrap(),
        )
        .unwrap();
        let loaded = Partition::load(dir.path(), "x").unwrap();
        assert_eq!(loaded.train_clients(), &[0, 1]);
        assert_eq!(loaded.indices(2).unwrap().test, vec![4, 5]);
    }

    #[test]
    fn test_validate_rejects_out_of_range_client() {
        let mut p = partition();
        p.separation.test = vec![5];
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_dataset_args_defaults_and_extra() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(DatasetArgs::load(dir.path()).unwrap().split, SplitPolicy::Sample);

        fs::write(
            dir.path().join("args.json"),
            r#"{"split": "user", "fraction": 0.8, "dataset": "mnist"}"#,
        )
        .unwrap();
        let args = DatasetArgs::load(dir.path()).unwrap();
        assert_eq!(args.split, SplitPolicy::User);
        assert_eq!(args.extra["dataset"], "mnist");
    }

    #[test]
    fn test_context_checks_user_split_and_pretrain() {
        let user = DatasetArgs {
            split: SplitPolicy::User,
            ..DatasetArgs::default()
        };
        assert!(ExperimentContext::new(RunConfig::default(), partition(), user.clone()).is_ok());

        let mut overlapping = partition();
        overlapping.separation.test = vec![1, 2];
        assert!(ExperimentContext::new(RunConfig::default(), overlapping, user).is_err());

        let pretrain = RunConfig {
            pretrain_epoch: 2,
            ..RunConfig::default()
        };
        assert!(matches!(
            ExperimentContext::new(pretrain, partition(), DatasetArgs::default()),
            Err(SimError::MissingPretrainData)
        ));
    }
}

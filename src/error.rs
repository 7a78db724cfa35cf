//! Error types for fedsim

use std::path::PathBuf;

use thiserror::Error;

use crate::ClientId;

/// All possible errors in a federated simulation run
#[derive(Error, Debug)]
pub enum SimError {
    /// The partition file for a dataset does not exist or cannot be read
    #[error("Partition file {path} not found: please partition {dataset} first")]
    PartitionNotFound {
        /// Dataset name from the run configuration
        dataset: String,
        /// Path that was probed
        path: PathBuf,
    },

    /// A configuration value violates its precondition
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation was invoked in the wrong parameter mode
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// The weights of a round sum to zero
    #[error("Aggregation weights sum to zero (no samples behind the round's updates)")]
    ZeroAggregationWeight,

    /// A round was handed to the aggregator a second time
    #[error("Round {0} has already been aggregated")]
    RoundAlreadyAggregated(usize),

    /// No updates were provided for aggregation
    #[error("Empty updates provided")]
    EmptyUpdates,

    /// Snapshots or weight lists have inconsistent layout
    #[error("Dimension mismatch in parameter snapshots")]
    DimensionMismatch,

    /// Tensor shape error
    #[error("Array shape error: {0}")]
    ShapeError(String),

    /// A parameter name is not part of the snapshot
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// The metrics ledger already holds an entry for this key
    #[error("Metrics for client {client} at round {round} already recorded")]
    DuplicateRecord {
        /// Client id
        client: ClientId,
        /// Round index
        round: usize,
    },

    /// The metrics ledger holds no entry for this key
    #[error("No metrics recorded for client {client} at round {round}")]
    MissingRecord {
        /// Client id
        client: ClientId,
        /// Round index
        round: usize,
    },

    /// A personalized run received an update without the local parameters
    #[error("Client {client} returned no local parameters in personalized mode")]
    MissingLocalParameters {
        /// Client id
        client: ClientId,
    },

    /// Pretraining was requested without a pretrain pool or dataset
    #[error("Pretraining requested but no pretrain data is available")]
    MissingPretrainData,

    /// The client trainer collaborator failed
    #[error("Client trainer error: {0}")]
    Trainer(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Layered configuration error
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<ndarray::ShapeError> for SimError {
    fn from(e: ndarray::ShapeError) -> Self {
        SimError::ShapeError(e.to_string())
    }
}

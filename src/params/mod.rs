//! Parameter state of a federated run.
//!
//! - [`ParameterSnapshot`] - ordered name → tensor mapping shared by global
//!   parameters, per-client parameters and update deltas
//! - [`ParameterStore`] - single owner of the global snapshot and, in
//!   [`ParamMode::Personalized`], one snapshot per train client

pub mod snapshot;
pub mod store;

pub use snapshot::ParameterSnapshot;
pub use store::{ParamMode, ParameterStore};

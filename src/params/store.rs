//! Canonical global parameters plus the optional per-client table.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ParameterSnapshot;
use crate::error::SimError;
use crate::ClientId;

/// Whether a run keeps one shared model or one model per client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    /// Regular FL: every client reads the single global snapshot
    Shared,
    /// Personalized FL: every train client owns an exclusive snapshot
    Personalized,
}

/// Owner of the global snapshot and, in personalized mode, the per-client table.
///
/// The store is the single writer of parameter state. Snapshots are handed
/// out as `Arc`s so shared-mode clients all read the same allocation; the
/// global snapshot is copied on write if a reader still holds it.
#[derive(Clone, Debug)]
pub struct ParameterStore {
    mode: ParamMode,
    global: Arc<ParameterSnapshot>,
    clients: BTreeMap<ClientId, Arc<ParameterSnapshot>>,
}

impl ParameterStore {
    /// Create a store seeded from `initial`.
    ///
    /// In personalized mode each of `train_clients` gets an independent copy.
    pub fn new(mode: ParamMode, initial: ParameterSnapshot, train_clients: &[ClientId]) -> Self {
        let mut store = Self {
            mode,
            global: Arc::new(initial),
            clients: BTreeMap::new(),
        };
        store.replicate_to(train_clients);
        store
    }

    /// Parameter mode of this store.
    pub fn mode(&self) -> ParamMode {
        self.mode
    }

    /// Fixed parameter name order.
    pub fn names(&self) -> &[String] {
        self.global.names()
    }

    /// The global snapshot.
    pub fn global(&self) -> &ParameterSnapshot {
        &self.global
    }

    /// Mutable access to the global snapshot (used by the aggregator).
    pub fn global_mut(&mut self) -> &mut ParameterSnapshot {
        Arc::make_mut(&mut self.global)
    }

    /// Snapshot a client trains or evaluates from.
    ///
    /// Shared mode returns the global snapshot itself. Personalized mode
    /// returns the client's own snapshot; clients without an entry (test-only
    /// clients under a user split) fall back to the global snapshot.
    pub fn snapshot_for(&self, client: ClientId) -> Arc<ParameterSnapshot> {
        match self.mode {
            ParamMode::Shared => Arc::clone(&self.global),
            ParamMode::Personalized => self
                .clients
                .get(&client)
                .map(Arc::clone)
                .unwrap_or_else(|| Arc::clone(&self.global)),
        }
    }

    /// Stored snapshot of one client (personalized mode only).
    pub fn client_params(&self, client: ClientId) -> Option<&ParameterSnapshot> {
        self.clients.get(&client).map(|p| p.as_ref())
    }

    /// Iterate over the per-client table in client id order.
    pub fn client_table(&self) -> impl Iterator<Item = (ClientId, &ParameterSnapshot)> {
        self.clients.iter().map(|(&id, p)| (id, p.as_ref()))
    }

    /// Overwrite the stored snapshot of each selected client.
    ///
    /// Fails with [`SimError::InvalidMode`] in shared mode, since no
    /// per-client parameters are kept there.
    pub fn apply_client_updates(
        &mut self,
        selected: &[ClientId],
        new_snapshots: Vec<ParameterSnapshot>,
    ) -> Result<(), SimError> {
        if self.mode != ParamMode::Personalized {
            return Err(SimError::InvalidMode(
                "per-client parameters are not kept in shared mode".to_string(),
            ));
        }
        if selected.len() != new_snapshots.len() {
            return Err(SimError::DimensionMismatch);
        }
        for snapshot in &new_snapshots {
            self.global.ensure_compatible(snapshot)?;
        }
        for (&client, snapshot) in selected.iter().zip(new_snapshots) {
            self.clients.insert(client, Arc::new(snapshot));
        }
        Ok(())
    }

    /// Re-seed global and per-client parameters from a freshly built model.
    ///
    /// The name order of `new_snapshot` becomes the store's order.
    pub fn replace_global(&mut self, new_snapshot: ParameterSnapshot) {
        let clients: Vec<ClientId> = self.clients.keys().copied().collect();
        self.global = Arc::new(new_snapshot);
        self.clients.clear();
        self.replicate_to(&clients);
    }

    fn replicate_to(&mut self, clients: &[ClientId]) {
        if self.mode == ParamMode::Personalized {
            for &client in clients {
                self.clients
                    .insert(client, Arc::new(self.global.as_ref().clone()));
            }
        }
    }
}

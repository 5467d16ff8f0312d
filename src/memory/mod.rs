//! In-memory document backend.
//!
//! Development and test datastore: a collection-per-type document store, a
//! generic persister driven entirely by the entity's mapping, and a backend
//! bundle wiring both into a session.

mod persister;
mod store;

pub use persister::MemoryPersister;
pub use store::MemoryStore;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::batch::{BatchExecutor, BatchOp};
use crate::error::BatchError;
use crate::mapping::EntityMapping;
use crate::persister::{ChangeTracking, Persister, PersisterProvider};

/// A [`MemoryStore`] together with persister policy; implements both
/// provider seams a session needs.
pub struct MemoryBackend {
    store: MemoryStore,
    default_tracking: ChangeTracking,
    tracking_overrides: RwLock<HashMap<String, ChangeTracking>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            store: MemoryStore::new(),
            default_tracking: ChangeTracking::default(),
            tracking_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Change-tracking mode handed to every persister this backend creates.
    pub fn with_change_tracking(mut self, tracking: ChangeTracking) -> Self {
        self.default_tracking = tracking;
        self
    }

    /// Override the change-tracking mode for one collection.
    pub fn set_tracking_for(&self, collection: impl Into<String>, tracking: ChangeTracking) {
        if let Ok(mut overrides) = self.tracking_overrides.write() {
            overrides.insert(collection.into(), tracking);
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl PersisterProvider for MemoryBackend {
    fn persister_for(&self, mapping: &Arc<dyn EntityMapping>) -> Option<Arc<dyn Persister>> {
        let tracking = self
            .tracking_overrides
            .read()
            .ok()
            .and_then(|overrides| overrides.get(mapping.collection()).copied())
            .unwrap_or(self.default_tracking);

        Some(Arc::new(
            MemoryPersister::new(self.store.clone(), mapping.clone()).with_change_tracking(tracking),
        ))
    }
}

impl BatchExecutor for MemoryBackend {
    fn execute(&self, ops: &[BatchOp]) -> Result<(), BatchError> {
        self.store.execute(ops)
    }
}

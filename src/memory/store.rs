//! MemoryStore - collection-per-type document storage backed by a HashMap.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::batch::{BatchExecutor, BatchOp};
use crate::document::Document;
use crate::error::{BatchError, PersisterError};

/// In-memory document store. Clone-friendly via `Arc`; every clone shares
/// the same collections.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, HashMap<String, Document>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, PersisterError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| PersisterError::LockPoisoned("store read"))?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    /// Upsert a document directly, bypassing batch semantics. Intended for
    /// seeding fixtures and tooling.
    pub fn insert_raw(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
        document: Document,
    ) -> Result<(), PersisterError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| PersisterError::LockPoisoned("store write"))?;
        collections
            .entry(collection.into())
            .or_default()
            .insert(id.into(), document);
        Ok(())
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|collections| collections.get(collection).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

impl BatchExecutor for MemoryStore {
    /// Apply every op in order. Each op is atomic; an error aborts the
    /// remainder of the batch, leaving earlier ops applied.
    fn execute(&self, ops: &[BatchOp]) -> Result<(), BatchError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| BatchError::Executor("store lock poisoned".into()))?;

        for op in ops {
            match op {
                BatchOp::Insert {
                    collection,
                    id,
                    document,
                } => {
                    let docs = collections.entry(collection.clone()).or_default();
                    if docs.contains_key(id) {
                        return Err(BatchError::DuplicateKey {
                            collection: collection.clone(),
                            id: id.clone(),
                        });
                    }
                    docs.insert(id.clone(), document.clone());
                }
                BatchOp::Update {
                    collection,
                    id,
                    document,
                } => {
                    let existing = collections
                        .get_mut(collection)
                        .and_then(|docs| docs.get_mut(id));
                    match existing {
                        Some(slot) => *slot = document.clone(),
                        None => {
                            return Err(BatchError::Missing {
                                collection: collection.clone(),
                                id: id.clone(),
                            })
                        }
                    }
                }
                BatchOp::Delete { collection, id } => {
                    // Deleting an absent document is not an error.
                    if let Some(docs) = collections.get_mut(collection) {
                        docs.remove(id);
                    }
                }
            }
        }

        Ok(())
    }
}

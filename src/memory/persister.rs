//! MemoryPersister - generic persister over a [`MemoryStore`].
//!
//! All entity/document conversion is delegated to the mapping's
//! reader/writers, so one implementation serves every mapped type.

use std::sync::Arc;

use crate::batch::Batch;
use crate::document::Document;
use crate::entity::EntityRef;
use crate::error::PersisterError;
use crate::identity::Id;
use crate::mapping::EntityMapping;
use crate::persister::{ChangeTracking, Loaded, Persister};

use super::MemoryStore;

pub struct MemoryPersister {
    store: MemoryStore,
    mapping: Arc<dyn EntityMapping>,
    tracking: ChangeTracking,
}

impl MemoryPersister {
    pub fn new(store: MemoryStore, mapping: Arc<dyn EntityMapping>) -> Self {
        MemoryPersister {
            store,
            mapping,
            tracking: ChangeTracking::default(),
        }
    }

    pub fn with_change_tracking(mut self, tracking: ChangeTracking) -> Self {
        self.tracking = tracking;
        self
    }

    fn entity_id(&self, entity: &EntityRef) -> Result<Id, PersisterError> {
        let guard = entity
            .read()
            .map_err(|_| PersisterError::LockPoisoned("entity read"))?;
        guard
            .identity()
            .ok_or_else(|| PersisterError::MissingIdentity(self.mapping.collection().to_string()))
    }

    fn build_document(&self, entity: &EntityRef) -> Result<Document, PersisterError> {
        let guard = entity
            .read()
            .map_err(|_| PersisterError::LockPoisoned("entity read"))?;
        Ok(self.mapping.to_document(&*guard)?)
    }
}

impl Persister for MemoryPersister {
    fn mapping(&self) -> &Arc<dyn EntityMapping> {
        &self.mapping
    }

    fn change_tracking(&self) -> ChangeTracking {
        self.tracking
    }

    fn find_one_by_id(&self, id: &Id) -> Result<Option<Loaded>, PersisterError> {
        let Some(document) = self.store.get(self.mapping.collection(), id.as_str())? else {
            return Ok(None);
        };
        let entity = self.mapping.hydrate(&document)?;
        Ok(Some(Loaded { entity, document }))
    }

    fn refresh(&self, entity: &EntityRef) -> Result<Document, PersisterError> {
        let id = self.entity_id(entity)?;
        let Some(document) = self.store.get(self.mapping.collection(), id.as_str())? else {
            return Err(PersisterError::Store(format!(
                "document {} no longer exists in {}",
                id,
                self.mapping.collection()
            )));
        };

        let mut guard = entity
            .write()
            .map_err(|_| PersisterError::LockPoisoned("entity write"))?;
        self.mapping.apply_document(&mut *guard, &document)?;
        Ok(document)
    }

    fn dirty_check(
        &self,
        batch: &mut Batch,
        entity: &EntityRef,
        original: &Document,
    ) -> Result<Document, PersisterError> {
        let id = self.entity_id(entity)?;
        let document = self.build_document(entity)?;
        if document != *original {
            batch.add_update(self.mapping.collection(), id.as_str(), document.clone());
        }
        Ok(document)
    }

    fn insert(&self, batch: &mut Batch, entity: &EntityRef) -> Result<Document, PersisterError> {
        let id = self.entity_id(entity)?;
        let document = self.build_document(entity)?;
        batch.add_insert(self.mapping.collection(), id.as_str(), document.clone());
        Ok(document)
    }

    fn remove(&self, batch: &mut Batch, entity: &EntityRef) -> Result<(), PersisterError> {
        let id = self.entity_id(entity)?;
        batch.add_delete(self.mapping.collection(), id.as_str());
        Ok(())
    }
}

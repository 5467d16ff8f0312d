//! Persister seam - mapping-specific adapter between entities and batches.
//!
//! The session owns one persister per mapping (cached by mapping key) and
//! calls it at its I/O suspension points: loads, refreshes, and the three
//! flush passes. Implementations translate entities to documents and append
//! operations to the flush batch; they never touch session state.

use std::fmt;
use std::sync::Arc;

use crate::batch::Batch;
use crate::document::Document;
use crate::entity::EntityRef;
use crate::error::PersisterError;
use crate::identity::{Id, IdentityGenerator};
use crate::mapping::EntityMapping;

/// When modifications to a managed entity are detected.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ChangeTracking {
    /// Every managed entity is diffed at flush time.
    #[default]
    DeferredImplicit,
    /// Only entities explicitly saved since the last flush are diffed.
    DeferredExplicit,
    /// Changes are observed as they happen; no flush-time diffing.
    Observe,
}

/// An entity loaded from the store together with its source document, which
/// becomes the link's snapshot.
pub struct Loaded {
    pub entity: EntityRef,
    pub document: Document,
}

impl fmt::Debug for dyn Persister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister")
            .field("mapping", &self.mapping().type_name())
            .finish()
    }
}

pub trait Persister: Send + Sync {
    fn mapping(&self) -> &Arc<dyn EntityMapping>;

    fn identity(&self) -> &dyn IdentityGenerator {
        self.mapping().identity()
    }

    fn change_tracking(&self) -> ChangeTracking;

    fn find_one_by_id(&self, id: &Id) -> Result<Option<Loaded>, PersisterError>;

    /// Reload the current document for a managed entity, rehydrate the live
    /// object in place, and return the new snapshot.
    fn refresh(&self, entity: &EntityRef) -> Result<Document, PersisterError>;

    /// Diff the entity against its snapshot, appending at most one update
    /// to the batch. Returns the document to use as the next snapshot.
    fn dirty_check(
        &self,
        batch: &mut Batch,
        entity: &EntityRef,
        original: &Document,
    ) -> Result<Document, PersisterError>;

    /// Append one insert to the batch and return the freshly built document.
    fn insert(&self, batch: &mut Batch, entity: &EntityRef) -> Result<Document, PersisterError>;

    /// Append one delete to the batch.
    fn remove(&self, batch: &mut Batch, entity: &EntityRef) -> Result<(), PersisterError>;
}

/// Creates persisters on demand, one per mapping. Returning `None` means the
/// backend cannot persist that mapping.
pub trait PersisterProvider: Send + Sync {
    fn persister_for(&self, mapping: &Arc<dyn EntityMapping>) -> Option<Arc<dyn Persister>>;
}

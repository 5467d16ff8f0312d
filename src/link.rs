//! ObjectLink and the identity table.
//!
//! One link exists per identity per session. The table is the session's
//! single source of truth for which objects are managed; everything else
//! (walk sets, flush plans) works off snapshots of it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::document::Document;
use crate::entity::{identity_of, set_identity_of, EntityRef};
use crate::error::SessionError;
use crate::persister::Persister;

/// Lifecycle state of a linked entity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LinkState {
    Managed,
    Detached,
    Removed,
}

/// The write the session intends to perform for a link on the next flush.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ScheduledOperation {
    #[default]
    None,
    Insert,
    Update,
    Delete,
    DirtyCheck,
}

/// Per-entity session record.
#[derive(Debug)]
pub struct ObjectLink {
    pub(crate) state: LinkState,
    pub(crate) scheduled: ScheduledOperation,
    pub(crate) object: EntityRef,
    /// Snapshot of the last-known persisted document. Absent for
    /// never-persisted inserts until their first successful flush.
    pub(crate) original: Option<Document>,
    pub(crate) persister: Arc<dyn Persister>,
}

impl ObjectLink {
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn scheduled(&self) -> ScheduledOperation {
        self.scheduled
    }

    pub fn object(&self) -> &EntityRef {
        &self.object
    }

    pub fn original_document(&self) -> Option<&Document> {
        self.original.as_ref()
    }

    pub fn persister(&self) -> &Arc<dyn Persister> {
        &self.persister
    }
}

/// Session-scoped map from stringified identity to [`ObjectLink`].
#[derive(Default)]
pub struct LinkTable {
    links: HashMap<String, ObjectLink>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link an entity. The entity must already carry its identity; linking a
    /// second object under an identity already present is a programmer error.
    pub(crate) fn link(
        &mut self,
        object: EntityRef,
        persister: Arc<dyn Persister>,
        scheduled: ScheduledOperation,
    ) -> Result<&mut ObjectLink, SessionError> {
        let id = identity_of(&object)?.ok_or_else(|| {
            SessionError::InvalidIdentifier("entity has no identity to link under".into())
        })?;
        let key = id.to_string();

        if self.links.contains_key(&key) {
            return Err(SessionError::DuplicateLink(key));
        }

        let link = ObjectLink {
            state: LinkState::Managed,
            scheduled,
            object,
            original: None,
            persister,
        };

        Ok(self.links.entry(key).or_insert(link))
    }

    /// Remove a link from the table. A never-persisted insert or a removed
    /// entity must not keep a stale identity, so its identity attribute is
    /// cleared here.
    pub(crate) fn unlink(&mut self, key: &str) -> Result<Option<ObjectLink>, SessionError> {
        let Some(link) = self.links.remove(key) else {
            return Ok(None);
        };

        if link.scheduled == ScheduledOperation::Insert || link.state == LinkState::Removed {
            set_identity_of(&link.object, None)?;
        }

        Ok(Some(link))
    }

    pub fn get(&self, key: &str) -> Option<&ObjectLink> {
        self.links.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut ObjectLink> {
        self.links.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.links.contains_key(key)
    }

    /// Snapshot of the current keys. Enumeration order is unspecified but
    /// stable while the table is not mutated.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.links.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.links.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &ObjectLink)> {
        self.links.iter()
    }
}

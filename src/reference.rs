//! Reference - lazy handle to a possibly-unloaded entity.
//!
//! A reference is either already resolved to a live object, or an
//! (mapping, id) pair whose target has not been loaded yet. Resolution
//! happens at most once and is visible through every clone of the same
//! reference.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::entity::{identity_of, EntityRef};
use crate::identity::Id;
use crate::mapping::EntityMapping;

#[derive(Clone)]
pub enum Reference {
    Resolved(EntityRef),
    Unresolved(Arc<UnresolvedReference>),
}

pub struct UnresolvedReference {
    mapping: Arc<dyn EntityMapping>,
    id: Id,
    target: OnceLock<EntityRef>,
}

impl Reference {
    pub fn resolved(entity: EntityRef) -> Self {
        Reference::Resolved(entity)
    }

    pub fn unresolved(mapping: Arc<dyn EntityMapping>, id: Id) -> Self {
        Reference::Unresolved(Arc::new(UnresolvedReference {
            mapping,
            id,
            target: OnceLock::new(),
        }))
    }

    pub fn is_resolved(&self) -> bool {
        self.entity().is_some()
    }

    /// The live target, when resolution has happened.
    pub fn entity(&self) -> Option<EntityRef> {
        match self {
            Reference::Resolved(entity) => Some(entity.clone()),
            Reference::Unresolved(inner) => inner.target.get().cloned(),
        }
    }

    /// The referenced identity. For a resolved reference this reads the
    /// target's identity attribute.
    pub fn id(&self) -> Option<Id> {
        match self {
            Reference::Resolved(entity) => identity_of(entity).ok().flatten(),
            Reference::Unresolved(inner) => Some(inner.id.clone()),
        }
    }

    /// The mapping of the referenced type. Only unresolved references carry
    /// one; a resolved target is classified through the registry instead.
    pub fn mapping(&self) -> Option<Arc<dyn EntityMapping>> {
        match self {
            Reference::Resolved(_) => None,
            Reference::Unresolved(inner) => Some(inner.mapping.clone()),
        }
    }

    /// Record the loaded target. A second fulfillment of the same reference
    /// is ignored; the first loaded object wins.
    pub(crate) fn fulfill(&self, entity: EntityRef) {
        if let Reference::Unresolved(inner) = self {
            let _ = inner.target.set(entity);
        }
    }
}

impl From<EntityRef> for Reference {
    fn from(entity: EntityRef) -> Self {
        Reference::Resolved(entity)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Resolved(_) => f.write_str("Reference::Resolved"),
            Reference::Unresolved(inner) => {
                if inner.target.get().is_some() {
                    write!(f, "Reference::Unresolved(fulfilled {})", inner.id)
                } else {
                    write!(f, "Reference::Unresolved({})", inner.id)
                }
            }
        }
    }
}

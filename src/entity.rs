//! EntityObject - the live-object side of the mapping.
//!
//! Application types implement [`EntityObject`] (usually through
//! [`impl_entity!`]) and are shared with the session as [`EntityRef`]
//! handles. The session compares live objects by handle pointer identity,
//! never by value.

use std::any::Any;
use std::sync::{Arc, RwLock};

use crate::error::SessionError;
use crate::identity::Id;

/// A live application object trackable by a session.
///
/// The identity attribute is the object's `_id`: absent until the object is
/// first saved or loaded, cleared again when a never-persisted or deleted
/// object is unlinked.
pub trait EntityObject: Any + Send + Sync {
    fn identity(&self) -> Option<Id>;

    fn set_identity(&mut self, id: Option<Id>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl std::fmt::Debug for dyn EntityObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityObject")
            .field("identity", &self.identity())
            .finish()
    }
}

/// Shared handle to a live object.
pub type EntityRef = Arc<RwLock<dyn EntityObject>>;

/// Wrap a concrete entity into a shareable handle.
pub fn entity_ref<E: EntityObject>(entity: E) -> EntityRef {
    Arc::new(RwLock::new(entity))
}

/// Stable key for handle pointer identity (cycle detection, visited sets).
pub(crate) fn handle_key(entity: &EntityRef) -> usize {
    Arc::as_ptr(entity) as *const () as usize
}

/// Read the identity attribute through the handle.
pub fn identity_of(entity: &EntityRef) -> Result<Option<Id>, SessionError> {
    let guard = entity
        .read()
        .map_err(|_| SessionError::LockPoisoned("entity read"))?;
    Ok(guard.identity())
}

pub(crate) fn set_identity_of(entity: &EntityRef, id: Option<Id>) -> Result<(), SessionError> {
    let mut guard = entity
        .write()
        .map_err(|_| SessionError::LockPoisoned("entity write"))?;
    guard.set_identity(id);
    Ok(())
}

/// Borrow the handle's target downcast to a concrete type.
/// Returns None when the target is of a different type.
pub fn read_as<E, R>(entity: &EntityRef, f: impl FnOnce(&E) -> R) -> Result<Option<R>, SessionError>
where
    E: EntityObject,
{
    let guard = entity
        .read()
        .map_err(|_| SessionError::LockPoisoned("entity read"))?;
    Ok(guard.as_any().downcast_ref::<E>().map(f))
}

/// Mutably borrow the handle's target downcast to a concrete type.
pub fn write_as<E, R>(
    entity: &EntityRef,
    f: impl FnOnce(&mut E) -> R,
) -> Result<Option<R>, SessionError>
where
    E: EntityObject,
{
    let mut guard = entity
        .write()
        .map_err(|_| SessionError::LockPoisoned("entity write"))?;
    Ok(guard.as_any_mut().downcast_mut::<E>().map(f))
}

/// Implement [`EntityObject`] for a struct whose identity lives in an
/// `Option<Id>` field.
///
/// ```ignore
/// struct Person {
///     id: Option<Id>,
///     name: String,
/// }
///
/// impl_entity!(Person, id);
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty, $id:ident) => {
        impl $crate::EntityObject for $ty {
            fn identity(&self) -> Option<$crate::Id> {
                self.$id.clone()
            }

            fn set_identity(&mut self, id: Option<$crate::Id>) {
                self.$id = id;
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

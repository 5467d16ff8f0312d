mod batch;
mod document;
mod entity;
mod error;
mod flags;
mod identity;
mod link;
mod mapping;
mod memory;
mod persister;
mod queue;
mod reference;
mod session;
mod walker;

pub use batch::{Batch, BatchExecutor, BatchOp, BatchOpKind};
pub use document::{document_id, Document, ID_FIELD};
pub use entity::{entity_ref, identity_of, read_as, write_as, EntityObject, EntityRef};
pub use error::{BatchError, MappingError, PersisterError, SessionError};
pub use flags::PropertyFlags;
pub use identity::{Id, IdentityGenerator, OpaqueGenerator, UuidGenerator};
pub use link::{LinkState, ObjectLink, ScheduledOperation};
pub use mapping::{
    EntityMapping, MappingKey, MappingKind, MappingRegistry, PropertyDef, PropertyValue,
};
pub use memory::{MemoryBackend, MemoryPersister, MemoryStore};
pub use persister::{ChangeTracking, Loaded, Persister, PersisterProvider};
pub use queue::{Action, ActionMask, TaskQueue, TaskPermit};
pub use reference::Reference;
pub use session::{LinkView, Session};
pub use walker::{GraphWalker, WalkSet};

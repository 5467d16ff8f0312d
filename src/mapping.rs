//! Mapping seam - how the session sees the metadata subsystem.
//!
//! The mapping registry and the per-type [`EntityMapping`] implementations
//! are supplied by the embedding application (or generated by a mapping
//! layer); the session only consumes them. A mapping describes one mapped
//! type: its collection, identity scheme, walkable properties, and the
//! reader/writer pair converting between live objects and documents.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::document::Document;
use crate::entity::{EntityObject, EntityRef};
use crate::error::MappingError;
use crate::flags::PropertyFlags;
use crate::identity::IdentityGenerator;
use crate::reference::Reference;

/// Stable small integer identifying a mapping. Keys the session's persister
/// cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct MappingKey(pub u32);

/// Whether a mapped type has its own identity (entity) or travels inside its
/// parent document (embedded value).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MappingKind {
    Entity,
    Embedded,
}

/// A property's current value as seen by the graph walker.
pub enum PropertyValue {
    /// Nothing to walk: primitives, strings, absent options.
    Scalar,
    Entity(EntityRef),
    Embedded(EntityRef),
    Reference(Reference),
    List(Vec<PropertyValue>),
}

/// One walkable property of a mapped type.
pub struct PropertyDef {
    pub name: &'static str,
    pub flags: PropertyFlags,
    /// Read the property off a live object of the mapped type.
    pub get: fn(&dyn EntityObject) -> PropertyValue,
}

/// Metadata and reader/writers for one mapped type.
pub trait EntityMapping: Send + Sync {
    fn key(&self) -> MappingKey;

    fn inheritance_root(&self) -> MappingKey {
        self.key()
    }

    fn kind(&self) -> MappingKind {
        MappingKind::Entity
    }

    /// Name of the backing collection.
    fn collection(&self) -> &str;

    /// `TypeId` of the concrete live type this mapping describes.
    fn mapped_type(&self) -> TypeId;

    /// Human-readable type name for error reporting.
    fn type_name(&self) -> &str;

    fn identity(&self) -> &dyn IdentityGenerator;

    fn properties(&self) -> &[PropertyDef];

    fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties().iter().find(|p| p.name == name)
    }

    /// Serialize the live object into its document form, identity included.
    fn to_document(&self, entity: &dyn EntityObject) -> Result<Document, MappingError>;

    /// Build a fresh live object from a document.
    fn hydrate(&self, document: &Document) -> Result<EntityRef, MappingError>;

    /// Overwrite a live object in place from a document (refresh path).
    fn apply_document(
        &self,
        entity: &mut dyn EntityObject,
        document: &Document,
    ) -> Result<(), MappingError>;
}

/// Registry of mappings, looked up by concrete type or by key.
#[derive(Default)]
pub struct MappingRegistry {
    by_type: HashMap<TypeId, Arc<dyn EntityMapping>>,
    by_key: HashMap<MappingKey, Arc<dyn EntityMapping>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping. A later registration for the same type or key
    /// replaces the earlier one.
    pub fn register(&mut self, mapping: Arc<dyn EntityMapping>) -> &mut Self {
        self.by_type.insert(mapping.mapped_type(), mapping.clone());
        self.by_key.insert(mapping.key(), mapping);
        self
    }

    pub fn mapping_for_object(&self, entity: &dyn EntityObject) -> Option<Arc<dyn EntityMapping>> {
        self.by_type.get(&entity.as_any().type_id()).cloned()
    }

    pub fn mapping_for<E: EntityObject>(&self) -> Option<Arc<dyn EntityMapping>> {
        self.by_type.get(&TypeId::of::<E>()).cloned()
    }

    pub fn mapping_by_key(&self, key: MappingKey) -> Option<Arc<dyn EntityMapping>> {
        self.by_key.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

//! Shared fixtures: a hand-written mapping for a small Person/Address
//! domain, plus session harnesses over the in-memory backend.

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, Weak};

use mapped_rust::{
    entity_ref, BatchError, BatchExecutor, BatchOp, ChangeTracking, Document, EntityMapping,
    EntityObject, EntityRef, Id, IdentityGenerator, MappingError, MappingKey, MappingKind,
    MappingRegistry, MemoryBackend, OpaqueGenerator, PropertyDef, PropertyFlags, PropertyValue,
    Reference, Session,
};
use serde_json::{json, Value};

pub struct Person {
    pub id: Option<Id>,
    pub first_name: String,
    pub last_name: String,
    pub spouse: Option<Reference>,
    pub children: Vec<Reference>,
    pub address: Option<EntityRef>,
}

mapped_rust::impl_entity!(Person, id);

impl Person {
    pub fn new(first_name: &str, last_name: &str) -> Person {
        Person {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            spouse: None,
            children: Vec::new(),
            address: None,
        }
    }
}

pub fn person(first_name: &str, last_name: &str) -> EntityRef {
    entity_ref(Person::new(first_name, last_name))
}

pub struct Address {
    pub street: String,
    pub city: String,
}

// Embedded value: no identity of its own.
impl EntityObject for Address {
    fn identity(&self) -> Option<Id> {
        None
    }

    fn set_identity(&mut self, _id: Option<Id>) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn reference_value(id: &Value, mapping: Arc<dyn EntityMapping>) -> Option<Reference> {
    id.as_str()
        .map(|s| Reference::unresolved(mapping, Id::new(s)))
}

pub struct PersonMapping {
    me: Weak<PersonMapping>,
    generator: OpaqueGenerator,
    properties: Vec<PropertyDef>,
}

impl PersonMapping {
    pub fn new() -> Arc<PersonMapping> {
        Arc::new_cyclic(|me| PersonMapping {
            me: me.clone(),
            generator: OpaqueGenerator,
            properties: vec![
                PropertyDef {
                    name: "spouse",
                    flags: PropertyFlags::CASCADE_SAVE
                        | PropertyFlags::CASCADE_REMOVE
                        | PropertyFlags::DEREFERENCE
                        | PropertyFlags::NULLABLE,
                    get: |obj| match obj.as_any().downcast_ref::<Person>() {
                        Some(person) => match &person.spouse {
                            Some(reference) => PropertyValue::Reference(reference.clone()),
                            None => PropertyValue::Scalar,
                        },
                        None => PropertyValue::Scalar,
                    },
                },
                PropertyDef {
                    name: "children",
                    flags: PropertyFlags::CASCADE_SAVE | PropertyFlags::CASCADE_REMOVE,
                    get: |obj| match obj.as_any().downcast_ref::<Person>() {
                        Some(person) => PropertyValue::List(
                            person
                                .children
                                .iter()
                                .map(|r| PropertyValue::Reference(r.clone()))
                                .collect(),
                        ),
                        None => PropertyValue::Scalar,
                    },
                },
                PropertyDef {
                    name: "address",
                    flags: PropertyFlags::NONE,
                    get: |obj| match obj.as_any().downcast_ref::<Person>() {
                        Some(person) => match &person.address {
                            Some(address) => PropertyValue::Embedded(address.clone()),
                            None => PropertyValue::Scalar,
                        },
                        None => PropertyValue::Scalar,
                    },
                },
            ],
        })
    }

    fn me(&self) -> Arc<dyn EntityMapping> {
        self.me.upgrade().expect("mapping still registered")
    }
}

impl EntityMapping for PersonMapping {
    fn key(&self) -> MappingKey {
        MappingKey(1)
    }

    fn collection(&self) -> &str {
        "people"
    }

    fn mapped_type(&self) -> TypeId {
        TypeId::of::<Person>()
    }

    fn type_name(&self) -> &str {
        "Person"
    }

    fn identity(&self) -> &dyn IdentityGenerator {
        &self.generator
    }

    fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    fn to_document(&self, entity: &dyn EntityObject) -> Result<Document, MappingError> {
        let person = entity
            .as_any()
            .downcast_ref::<Person>()
            .ok_or_else(|| MappingError::Serialize("expected a Person".into()))?;

        let spouse = person
            .spouse
            .as_ref()
            .and_then(|r| r.id())
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null);
        let children: Vec<Value> = person
            .children
            .iter()
            .filter_map(|r| r.id())
            .map(|id| Value::String(id.to_string()))
            .collect();
        let address = match &person.address {
            Some(address) => {
                let guard = address.read().expect("address lock");
                let address = guard
                    .as_any()
                    .downcast_ref::<Address>()
                    .ok_or_else(|| MappingError::Serialize("expected an Address".into()))?;
                json!({ "street": address.street, "city": address.city })
            }
            None => Value::Null,
        };

        Ok(json!({
            "_id": person.id.as_ref().map(|id| id.to_string()),
            "firstName": person.first_name,
            "lastName": person.last_name,
            "spouse": spouse,
            "children": children,
            "address": address,
        }))
    }

    fn hydrate(&self, document: &Document) -> Result<EntityRef, MappingError> {
        let id = document["_id"]
            .as_str()
            .ok_or_else(|| MappingError::Hydrate("document has no _id".into()))?;

        let mut person = Person::new(
            document["firstName"].as_str().unwrap_or_default(),
            document["lastName"].as_str().unwrap_or_default(),
        );
        person.id = Some(Id::new(id));
        person.spouse = reference_value(&document["spouse"], self.me());
        if let Some(children) = document["children"].as_array() {
            person.children = children
                .iter()
                .filter_map(|c| reference_value(c, self.me()))
                .collect();
        }
        if document["address"].is_object() {
            person.address = Some(entity_ref(Address {
                street: document["address"]["street"]
                    .as_str()
                    .unwrap_or_default()
                    .into(),
                city: document["address"]["city"]
                    .as_str()
                    .unwrap_or_default()
                    .into(),
            }));
        }

        Ok(entity_ref(person))
    }

    fn apply_document(
        &self,
        entity: &mut dyn EntityObject,
        document: &Document,
    ) -> Result<(), MappingError> {
        let person = entity
            .as_any_mut()
            .downcast_mut::<Person>()
            .ok_or_else(|| MappingError::Hydrate("expected a Person".into()))?;

        person.first_name = document["firstName"].as_str().unwrap_or_default().into();
        person.last_name = document["lastName"].as_str().unwrap_or_default().into();
        person.spouse = reference_value(&document["spouse"], self.me());
        person.children = document["children"]
            .as_array()
            .map(|children| {
                children
                    .iter()
                    .filter_map(|c| reference_value(c, self.me()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(())
    }
}

pub struct AddressMapping {
    generator: OpaqueGenerator,
}

impl AddressMapping {
    pub fn new() -> Arc<AddressMapping> {
        Arc::new(AddressMapping {
            generator: OpaqueGenerator,
        })
    }
}

impl EntityMapping for AddressMapping {
    fn key(&self) -> MappingKey {
        MappingKey(2)
    }

    fn kind(&self) -> MappingKind {
        MappingKind::Embedded
    }

    fn collection(&self) -> &str {
        "addresses"
    }

    fn mapped_type(&self) -> TypeId {
        TypeId::of::<Address>()
    }

    fn type_name(&self) -> &str {
        "Address"
    }

    fn identity(&self) -> &dyn IdentityGenerator {
        &self.generator
    }

    fn properties(&self) -> &[PropertyDef] {
        &[]
    }

    fn to_document(&self, entity: &dyn EntityObject) -> Result<Document, MappingError> {
        let address = entity
            .as_any()
            .downcast_ref::<Address>()
            .ok_or_else(|| MappingError::Serialize("expected an Address".into()))?;
        Ok(json!({ "street": address.street, "city": address.city }))
    }

    fn hydrate(&self, document: &Document) -> Result<EntityRef, MappingError> {
        Ok(entity_ref(Address {
            street: document["street"].as_str().unwrap_or_default().into(),
            city: document["city"].as_str().unwrap_or_default().into(),
        }))
    }

    fn apply_document(
        &self,
        entity: &mut dyn EntityObject,
        document: &Document,
    ) -> Result<(), MappingError> {
        let address = entity
            .as_any_mut()
            .downcast_mut::<Address>()
            .ok_or_else(|| MappingError::Hydrate("expected an Address".into()))?;
        address.street = document["street"].as_str().unwrap_or_default().into();
        address.city = document["city"].as_str().unwrap_or_default().into();
        Ok(())
    }
}

/// A type registered nowhere, for unmapped-error tests.
pub struct Stranger {
    pub id: Option<Id>,
}

mapped_rust::impl_entity!(Stranger, id);

pub fn registry() -> Arc<MappingRegistry> {
    let mut registry = MappingRegistry::new();
    registry.register(PersonMapping::new());
    registry.register(AddressMapping::new());
    Arc::new(registry)
}

/// Executor wrapper that records every op it forwards.
pub struct RecordingExecutor {
    inner: Arc<MemoryBackend>,
    ops: Mutex<Vec<BatchOp>>,
}

impl RecordingExecutor {
    pub fn new(inner: Arc<MemoryBackend>) -> Arc<RecordingExecutor> {
        Arc::new(RecordingExecutor {
            inner,
            ops: Mutex::new(Vec::new()),
        })
    }

    /// Drain the recorded ops.
    pub fn take_ops(&self) -> Vec<BatchOp> {
        std::mem::take(&mut *self.ops.lock().expect("recorder lock"))
    }
}

impl BatchExecutor for RecordingExecutor {
    fn execute(&self, ops: &[BatchOp]) -> Result<(), BatchError> {
        self.ops.lock().expect("recorder lock").extend_from_slice(ops);
        self.inner.execute(ops)
    }
}

/// Executor that always fails, for poisoning tests.
pub struct FailingExecutor;

impl BatchExecutor for FailingExecutor {
    fn execute(&self, _ops: &[BatchOp]) -> Result<(), BatchError> {
        Err(BatchError::Executor("store unavailable".into()))
    }
}

pub struct Harness {
    pub registry: Arc<MappingRegistry>,
    pub backend: Arc<MemoryBackend>,
    pub recorder: Arc<RecordingExecutor>,
    pub session: Session,
}

impl Harness {
    pub fn new() -> Harness {
        Harness::with_tracking(ChangeTracking::DeferredImplicit)
    }

    pub fn with_tracking(tracking: ChangeTracking) -> Harness {
        let registry = registry();
        let backend = Arc::new(MemoryBackend::new().with_change_tracking(tracking));
        let recorder = RecordingExecutor::new(backend.clone());
        let session = Session::new(registry.clone(), backend.clone(), recorder.clone());
        Harness {
            registry,
            backend,
            recorder,
            session,
        }
    }

    /// A second session over the same backend.
    pub fn fresh_session(&self) -> Session {
        Session::new(
            self.registry.clone(),
            self.backend.clone(),
            self.backend.clone(),
        )
    }

    /// Seed a bare person document.
    pub fn seed_person(&self, id: &str, first_name: &str, last_name: &str) {
        self.backend
            .store()
            .insert_raw(
                "people",
                id,
                json!({
                    "_id": id,
                    "firstName": first_name,
                    "lastName": last_name,
                    "spouse": null,
                    "children": [],
                    "address": null,
                }),
            )
            .expect("seed person");
    }
}

//! Session - the unit of work.
//!
//! Tracks every entity associated with it by identity, moves entities
//! through their lifecycle, and batches scheduled writes into a flush
//! against the backing store. User-facing operations are serialized through
//! the task queue; the session's mutable state lives behind one mutex that
//! is released across persister and executor calls.

mod flush;

use std::any::type_name;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::batch::BatchExecutor;
use crate::document::Document;
use crate::entity::{identity_of, set_identity_of, EntityObject, EntityRef};
use crate::error::SessionError;
use crate::flags::PropertyFlags;
use crate::identity::Id;
use crate::link::{LinkState, LinkTable, ScheduledOperation};
use crate::mapping::{EntityMapping, MappingKey, MappingRegistry, PropertyValue};
use crate::persister::{ChangeTracking, Persister, PersisterProvider};
use crate::queue::{Action, TaskQueue};
use crate::reference::Reference;
use crate::walker::{GraphWalker, WalkSet};

/// Read-only view of one link, for callers that need to observe session
/// bookkeeping (tooling, assertions).
#[derive(Clone)]
pub struct LinkView {
    pub state: LinkState,
    pub scheduled: ScheduledOperation,
    pub original: Option<Document>,
}

pub(crate) struct SessionState {
    pub(crate) links: LinkTable,
    persisters: HashMap<MappingKey, Arc<dyn Persister>>,
    pub(crate) poisoned: bool,
}

pub struct Session {
    registry: Arc<MappingRegistry>,
    provider: Arc<dyn PersisterProvider>,
    executor: Arc<dyn BatchExecutor>,
    queue: TaskQueue,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        registry: Arc<MappingRegistry>,
        provider: Arc<dyn PersisterProvider>,
        executor: Arc<dyn BatchExecutor>,
    ) -> Self {
        Session {
            registry,
            provider,
            executor,
            queue: TaskQueue::new(),
            state: Mutex::new(SessionState {
                links: LinkTable::new(),
                persisters: HashMap::new(),
                poisoned: false,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Make the entity and everything reachable over cascade-save edges
    /// managed, scheduling inserts for never-persisted objects.
    pub fn save(&self, entity: &EntityRef) -> Result<(), SessionError> {
        let _permit = self.queue.acquire(Action::Save)?;
        self.ensure_live()?;

        let set = self.walk_with_resolution(entity, PropertyFlags::CASCADE_SAVE)?;
        let mut state = self.lock_state()?;
        for entity in &set.entities {
            self.apply_save(&mut state, entity)?;
        }
        Ok(())
    }

    /// Schedule deletion of the entity and everything reachable over
    /// cascade-remove and dereference edges. Applied leaves-first, so
    /// children are dealt with before their parents.
    pub fn remove(&self, entity: &EntityRef) -> Result<(), SessionError> {
        let _permit = self.queue.acquire(Action::Remove)?;
        self.ensure_live()?;

        let cascade = PropertyFlags::CASCADE_REMOVE | PropertyFlags::DEREFERENCE;
        let set = self.walk_with_resolution(entity, cascade)?;
        let mut state = self.lock_state()?;
        for entity in set.entities.iter().rev() {
            Self::apply_remove(&mut state, entity)?;
        }
        Ok(())
    }

    /// Disassociate the entity and everything reachable over cascade-detach
    /// edges. Detached entities keep their identity unless they were never
    /// persisted.
    pub fn detach(&self, entity: &EntityRef) -> Result<(), SessionError> {
        let _permit = self.queue.acquire(Action::Detach)?;
        self.ensure_live()?;

        let set = self.walk_with_resolution(entity, PropertyFlags::CASCADE_DETACH)?;
        let mut state = self.lock_state()?;
        for entity in &set.entities {
            let Some(id) = identity_of(entity)? else {
                continue;
            };
            let key = id.to_string();
            let same = state
                .links
                .get(&key)
                .map(|link| Arc::ptr_eq(&link.object, entity));
            if same == Some(true) {
                state.links.unlink(&key)?;
            }
        }
        Ok(())
    }

    /// Reload the entity and everything reachable over cascade-refresh edges
    /// from the store, replacing both the live state and the snapshots.
    pub fn refresh(&self, entity: &EntityRef) -> Result<(), SessionError> {
        let _permit = self.queue.acquire(Action::Refresh)?;
        self.ensure_live()?;

        let set = self.walk_with_resolution(entity, PropertyFlags::CASCADE_REFRESH)?;

        // Validate the whole set before touching the store.
        let mut work = Vec::with_capacity(set.entities.len());
        {
            let state = self.lock_state()?;
            for entity in &set.entities {
                let id = identity_of(entity)?
                    .ok_or_else(|| SessionError::Detached("<no identity>".into()))?;
                let key = id.to_string();
                let link = state
                    .links
                    .get(&key)
                    .ok_or_else(|| SessionError::Detached(key.clone()))?;
                if link.state != LinkState::Managed || !Arc::ptr_eq(&link.object, entity) {
                    return Err(SessionError::Detached(key));
                }
                work.push((entity.clone(), link.persister.clone(), key));
            }
        }

        for (entity, persister, key) in work {
            let document = persister.refresh(&entity)?;
            let mut state = self.lock_state()?;
            if let Some(link) = state.links.get_mut(&key) {
                link.original = Some(document);
            }
        }
        Ok(())
    }

    /// Discard the whole identity table. Pending writes are lost.
    pub fn clear(&self) -> Result<(), SessionError> {
        let _permit = self.queue.acquire(Action::Clear)?;
        let mut state = self.lock_state()?;
        if state.poisoned {
            return Err(SessionError::Poisoned);
        }
        state.links.clear();
        Ok(())
    }

    /// Load one entity by its stringified id. Entities already managed under
    /// that identity are returned as-is; removed ones read as absent.
    pub fn find<E: EntityObject>(&self, id: &str) -> Result<Option<EntityRef>, SessionError> {
        let _permit = self.queue.acquire(Action::Find)?;
        self.ensure_live()?;

        let mapping = self
            .registry
            .mapping_for::<E>()
            .ok_or_else(|| SessionError::Unmapped(type_name::<E>().into()))?;
        let id = mapping
            .identity()
            .parse(id)
            .ok_or_else(|| SessionError::InvalidIdentifier(id.into()))?;
        let key = id.to_string();

        let persister = {
            let mut state = self.lock_state()?;
            if let Some(link) = state.links.get(&key) {
                return Ok(match link.state {
                    LinkState::Removed => None,
                    _ => Some(link.object.clone()),
                });
            }
            Self::persister_for(&mut state, &self.provider, &mapping)?
        };

        let Some(loaded) = persister.find_one_by_id(&id)? else {
            return Ok(None);
        };

        let mut state = self.lock_state()?;
        if let Some(link) = state.links.get(&key) {
            // Lost a race against an overlapping load; keep the first link.
            return Ok(match link.state {
                LinkState::Removed => None,
                _ => Some(link.object.clone()),
            });
        }
        let link = state
            .links
            .link(loaded.entity.clone(), persister, ScheduledOperation::None)?;
        link.original = Some(loaded.document);
        Ok(Some(loaded.entity))
    }

    /// Resolve the target (loading it if necessary), then dereference each
    /// dotted path on the result, resolving references along the way.
    pub fn fetch(
        &self,
        target: impl Into<Reference>,
        paths: &[&str],
    ) -> Result<EntityRef, SessionError> {
        let _permit = self.queue.acquire(Action::Fetch)?;
        self.ensure_live()?;

        let reference = target.into();
        let entity = self.resolve_reference(&reference)?;
        for path in paths {
            let segments: Vec<&str> = path.split('.').collect();
            self.fetch_segments(&entity, &segments)?;
        }
        Ok(entity)
    }

    /// Write every scheduled operation to the store as one batch.
    pub fn flush(&self) -> Result<(), SessionError> {
        let _permit = self.queue.acquire(Action::Flush)?;
        self.ensure_live()?;

        let entries = {
            let state = self.lock_state()?;
            flush::plan_entries(&state)
        };

        let (batch, outcome) = flush::build(&entries)?;

        match batch.execute(self.executor.as_ref()) {
            Ok(()) => {
                let mut state = self.lock_state()?;
                flush::reconcile(&mut state, outcome)
            }
            Err(err) => {
                // Scheduled operations stay as they were; the session no
                // longer accepts operations.
                let mut state = self.lock_state()?;
                state.poisoned = true;
                Err(err.into())
            }
        }
    }

    // ------------------------------------------------------------------
    // Read-only surface
    // ------------------------------------------------------------------

    /// True when the entity's identity maps to a link that is not removed.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        let Ok(Some(id)) = identity_of(entity) else {
            return false;
        };
        let Ok(state) = self.state.lock() else {
            return false;
        };
        state
            .links
            .get(&id.to_string())
            .is_some_and(|link| link.state != LinkState::Removed)
    }

    /// The entity's identity, if it has been assigned one.
    pub fn get_id(&self, entity: &EntityRef) -> Option<Id> {
        identity_of(entity).ok().flatten()
    }

    /// The managed entity under `id`, or an unresolved reference to it.
    /// Never performs I/O.
    pub fn get_reference<E: EntityObject>(&self, id: &str) -> Result<Reference, SessionError> {
        let mapping = self
            .registry
            .mapping_for::<E>()
            .ok_or_else(|| SessionError::Unmapped(type_name::<E>().into()))?;
        let id = mapping
            .identity()
            .parse(id)
            .ok_or_else(|| SessionError::InvalidIdentifier(id.into()))?;

        let state = self.lock_state()?;
        match state.links.get(&id.to_string()) {
            Some(link) if link.state != LinkState::Removed => {
                Ok(Reference::resolved(link.object.clone()))
            }
            _ => Ok(Reference::unresolved(mapping, id)),
        }
    }

    /// Bookkeeping view of the entity's link, when one exists.
    pub fn link_of(&self, entity: &EntityRef) -> Option<LinkView> {
        let id = identity_of(entity).ok().flatten()?;
        let state = self.state.lock().ok()?;
        state.links.get(&id.to_string()).map(|link| LinkView {
            state: link.state(),
            scheduled: link.scheduled(),
            original: link.original_document().cloned(),
        })
    }

    /// Number of live (non-removed) links.
    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state
                .links
                .iter()
                .filter(|(_, link)| link.state() != LinkState::Removed)
                .count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.lock().map(|state| state.poisoned).unwrap_or(true)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        self.state
            .lock()
            .map_err(|_| SessionError::LockPoisoned("session state"))
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.lock_state()?.poisoned {
            return Err(SessionError::Poisoned);
        }
        Ok(())
    }

    fn persister_for(
        state: &mut SessionState,
        provider: &Arc<dyn PersisterProvider>,
        mapping: &Arc<dyn EntityMapping>,
    ) -> Result<Arc<dyn Persister>, SessionError> {
        if let Some(persister) = state.persisters.get(&mapping.key()) {
            return Ok(persister.clone());
        }
        let persister = provider
            .persister_for(mapping)
            .ok_or_else(|| SessionError::Unmapped(mapping.type_name().into()))?;
        state.persisters.insert(mapping.key(), persister.clone());
        Ok(persister)
    }

    /// Walk from `root`, loading and linking unresolved references until the
    /// reachable set is closed.
    fn walk_with_resolution(
        &self,
        root: &EntityRef,
        cascade: PropertyFlags,
    ) -> Result<WalkSet, SessionError> {
        let mut walker = GraphWalker::new(&self.registry, cascade);
        walker.walk(root)?;
        loop {
            let unresolved = walker.take_unresolved();
            if unresolved.is_empty() {
                break;
            }
            for reference in unresolved {
                let entity = self.resolve_reference(&reference)?;
                walker.walk(&entity)?;
            }
        }
        Ok(walker.finish())
    }

    /// Resolve a reference to its live target, loading and linking it when
    /// it is not already managed.
    fn resolve_reference(&self, reference: &Reference) -> Result<EntityRef, SessionError> {
        if let Some(entity) = reference.entity() {
            return Ok(entity);
        }
        let (mapping, id) = match (reference.mapping(), reference.id()) {
            (Some(mapping), Some(id)) => (mapping, id),
            _ => {
                return Err(SessionError::ReferenceResolution(
                    "reference carries no target".into(),
                ))
            }
        };
        let key = id.to_string();

        let persister = {
            let mut state = self.lock_state()?;
            if let Some(link) = state.links.get(&key) {
                let entity = link.object.clone();
                reference.fulfill(entity.clone());
                return Ok(entity);
            }
            Self::persister_for(&mut state, &self.provider, &mapping)?
        };

        let Some(loaded) = persister.find_one_by_id(&id)? else {
            return Err(SessionError::ReferenceResolution(format!(
                "no document {} in {}",
                id,
                mapping.collection()
            )));
        };

        let mut state = self.lock_state()?;
        if let Some(link) = state.links.get(&key) {
            // An overlapping load linked it first; use that object.
            let entity = link.object.clone();
            reference.fulfill(entity.clone());
            return Ok(entity);
        }
        let link = state
            .links
            .link(loaded.entity.clone(), persister, ScheduledOperation::None)?;
        link.original = Some(loaded.document);
        reference.fulfill(loaded.entity.clone());
        Ok(loaded.entity)
    }

    fn apply_save(&self, state: &mut SessionState, entity: &EntityRef) -> Result<(), SessionError> {
        match identity_of(entity)? {
            None => {
                let mapping = {
                    let guard = entity
                        .read()
                        .map_err(|_| SessionError::LockPoisoned("entity read"))?;
                    self.registry
                        .mapping_for_object(&*guard)
                        .ok_or_else(|| SessionError::Unmapped("object of unregistered type".into()))?
                };
                let persister = Self::persister_for(state, &self.provider, &mapping)?;
                let fresh = persister.identity().generate();
                set_identity_of(entity, Some(fresh))?;
                state
                    .links
                    .link(entity.clone(), persister, ScheduledOperation::Insert)?;
                Ok(())
            }
            Some(id) => {
                let key = id.to_string();
                let (link_state, scheduled, tracking, same_object) = {
                    let link = state
                        .links
                        .get(&key)
                        .ok_or_else(|| SessionError::Detached(key.clone()))?;
                    (
                        link.state(),
                        link.scheduled(),
                        link.persister().change_tracking(),
                        Arc::ptr_eq(&link.object, entity),
                    )
                };
                if !same_object {
                    return Err(SessionError::Detached(key));
                }

                match (link_state, scheduled) {
                    // Cancel a pending delete.
                    (LinkState::Removed, _) => {
                        if let Some(link) = state.links.get_mut(&key) {
                            link.state = LinkState::Managed;
                            link.scheduled = ScheduledOperation::None;
                        }
                    }
                    (LinkState::Managed, ScheduledOperation::None) => {
                        // Explicit tracking requires save to mark for diffing.
                        if tracking == ChangeTracking::DeferredExplicit {
                            if let Some(link) = state.links.get_mut(&key) {
                                link.scheduled = ScheduledOperation::DirtyCheck;
                            }
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
        }
    }

    fn apply_remove(state: &mut SessionState, entity: &EntityRef) -> Result<(), SessionError> {
        // Never-identified objects have nothing to delete.
        let Some(id) = identity_of(entity)? else {
            return Ok(());
        };
        let key = id.to_string();
        let (link_state, scheduled, same_object) = {
            let link = state
                .links
                .get(&key)
                .ok_or_else(|| SessionError::Detached(key.clone()))?;
            (
                link.state(),
                link.scheduled(),
                Arc::ptr_eq(&link.object, entity),
            )
        };
        if !same_object {
            return Err(SessionError::Detached(key));
        }

        match (link_state, scheduled) {
            // Never persisted: unlink synchronously, no delete op needed.
            (LinkState::Managed, ScheduledOperation::Insert) => {
                state.links.unlink(&key)?;
            }
            (LinkState::Managed, _) => {
                if let Some(link) = state.links.get_mut(&key) {
                    link.state = LinkState::Removed;
                    link.scheduled = ScheduledOperation::Delete;
                }
            }
            // Already removed: nothing further to schedule.
            _ => {}
        }
        Ok(())
    }

    fn fetch_segments(&self, entity: &EntityRef, segments: &[&str]) -> Result<(), SessionError> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(());
        };
        let mapping = {
            let guard = entity
                .read()
                .map_err(|_| SessionError::LockPoisoned("entity read"))?;
            self.registry
                .mapping_for_object(&*guard)
                .ok_or_else(|| SessionError::Unmapped("object of unregistered type".into()))?
        };
        // Unknown path segments dereference nothing.
        let Some(property) = mapping.property(head) else {
            return Ok(());
        };
        let value = {
            let guard = entity
                .read()
                .map_err(|_| SessionError::LockPoisoned("entity read"))?;
            (property.get)(&*guard)
        };
        self.fetch_value(value, rest)
    }

    fn fetch_value(&self, value: PropertyValue, rest: &[&str]) -> Result<(), SessionError> {
        match value {
            PropertyValue::Scalar => Ok(()),
            PropertyValue::Entity(entity) | PropertyValue::Embedded(entity) => {
                self.fetch_segments(&entity, rest)
            }
            PropertyValue::Reference(reference) => {
                let entity = self.resolve_reference(&reference)?;
                self.fetch_segments(&entity, rest)
            }
            PropertyValue::List(values) => {
                for value in values {
                    self.fetch_value(value, rest)?;
                }
                Ok(())
            }
        }
    }
}

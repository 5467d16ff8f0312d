//! GraphWalker - cascade-directed traversal of an entity graph.
//!
//! Produces the materialized set of entities and embedded values reachable
//! from a root through property edges whose flags intersect the requested
//! cascade mask. Parents precede their children in the entity list, so
//! callers applying destructive transitions iterate it in reverse.

use std::collections::HashSet;

use crate::entity::{handle_key, EntityRef};
use crate::error::SessionError;
use crate::flags::PropertyFlags;
use crate::mapping::{MappingKind, MappingRegistry, PropertyValue};
use crate::reference::Reference;

/// Result of a completed walk.
pub struct WalkSet {
    /// Reached entities, pre-order (parents before children).
    pub entities: Vec<EntityRef>,
    /// Reached embedded values, in encounter order.
    pub embedded: Vec<EntityRef>,
}

pub struct GraphWalker<'a> {
    registry: &'a MappingRegistry,
    cascade: PropertyFlags,
    visited: HashSet<usize>,
    entities: Vec<EntityRef>,
    embedded: Vec<EntityRef>,
    unresolved: Vec<Reference>,
}

impl<'a> GraphWalker<'a> {
    pub fn new(registry: &'a MappingRegistry, cascade: PropertyFlags) -> Self {
        GraphWalker {
            registry,
            cascade,
            visited: HashSet::new(),
            entities: Vec::new(),
            embedded: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    /// Walk from `root`. May be called again for the targets of resolved
    /// references; the visited set carries over, so each object is collected
    /// exactly once across calls.
    pub fn walk(&mut self, root: &EntityRef) -> Result<(), SessionError> {
        if !self.visited.insert(handle_key(root)) {
            return Ok(());
        }

        let mapping = {
            let guard = root
                .read()
                .map_err(|_| SessionError::LockPoisoned("entity read"))?;
            self.registry
                .mapping_for_object(&*guard)
                .ok_or_else(|| SessionError::Unmapped("object of unregistered type".into()))?
        };

        match mapping.kind() {
            MappingKind::Entity => self.entities.push(root.clone()),
            MappingKind::Embedded => self.embedded.push(root.clone()),
        }

        for property in mapping.properties() {
            if property.flags.contains(PropertyFlags::IGNORED) {
                continue;
            }

            // Read the value, then drop the guard before descending.
            let value = {
                let guard = root
                    .read()
                    .map_err(|_| SessionError::LockPoisoned("entity read"))?;
                (property.get)(&*guard)
            };

            self.walk_value(value, property.flags)?;
        }

        Ok(())
    }

    fn walk_value(
        &mut self,
        value: PropertyValue,
        flags: PropertyFlags,
    ) -> Result<(), SessionError> {
        match value {
            PropertyValue::Scalar => Ok(()),
            // Embedded values travel with their parent document and are
            // always part of the reachable set.
            PropertyValue::Embedded(embedded) => self.walk(&embedded),
            PropertyValue::Entity(entity) => {
                if flags.intersects(self.cascade) {
                    self.walk(&entity)
                } else {
                    Ok(())
                }
            }
            PropertyValue::Reference(reference) => {
                if !flags.intersects(self.cascade) {
                    return Ok(());
                }
                match reference.entity() {
                    Some(entity) => self.walk(&entity),
                    None => {
                        self.unresolved.push(reference);
                        Ok(())
                    }
                }
            }
            PropertyValue::List(values) => {
                for element in values {
                    self.walk_value(element, flags)?;
                }
                Ok(())
            }
        }
    }

    /// Drain the unresolved references collected so far. The caller loads
    /// and links each target, then continues the walk from it.
    pub fn take_unresolved(&mut self) -> Vec<Reference> {
        std::mem::take(&mut self.unresolved)
    }

    pub fn finish(self) -> WalkSet {
        WalkSet {
            entities: self.entities,
            embedded: self.embedded,
        }
    }
}

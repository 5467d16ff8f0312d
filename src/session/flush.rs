//! Flush planner - materializes scheduled work into one ordered batch.
//!
//! Three passes over a snapshot of the link table: dirty-check, insert,
//! delete. The pass order keeps the batch grouped by kind and guarantees
//! that updates precede inserts and that no insert follows a delete for the
//! same identity. Links are only reconciled after the batch has executed;
//! a failed execution leaves every scheduled operation in place.

use std::sync::Arc;

use crate::batch::Batch;
use crate::document::Document;
use crate::entity::EntityRef;
use crate::error::SessionError;
use crate::link::{LinkState, ScheduledOperation};
use crate::persister::{ChangeTracking, Persister};

use super::SessionState;

/// One link, snapshotted at flush entry.
pub(crate) struct PlanEntry {
    key: String,
    object: EntityRef,
    persister: Arc<dyn Persister>,
    state: LinkState,
    scheduled: ScheduledOperation,
    original: Option<Document>,
}

/// Link updates to apply once the batch has executed.
pub(crate) struct FlushOutcome {
    /// New snapshots from the dirty-check and insert passes.
    snapshots: Vec<(String, Document)>,
    /// Links to unlink after a successful delete.
    deleted: Vec<String>,
}

/// Snapshot the table in its enumeration order. The order is unspecified
/// but fixed for all three passes of this flush.
pub(crate) fn plan_entries(state: &SessionState) -> Vec<PlanEntry> {
    state
        .links
        .iter()
        .map(|(key, link)| PlanEntry {
            key: key.clone(),
            object: link.object().clone(),
            persister: link.persister().clone(),
            state: link.state(),
            scheduled: link.scheduled(),
            original: link.original_document().cloned(),
        })
        .collect()
}

/// Run the three passes, assembling the batch. A persister error aborts the
/// whole flush with no link touched.
pub(crate) fn build(entries: &[PlanEntry]) -> Result<(Batch, FlushOutcome), SessionError> {
    let mut batch = Batch::new();
    let mut outcome = FlushOutcome {
        snapshots: Vec::new(),
        deleted: Vec::new(),
    };

    // Pass 1: dirty checks, explicit and implicit.
    for entry in entries {
        let implicit = entry.state == LinkState::Managed
            && entry.scheduled == ScheduledOperation::None
            && entry.persister.change_tracking() == ChangeTracking::DeferredImplicit;
        if entry.scheduled != ScheduledOperation::DirtyCheck && !implicit {
            continue;
        }
        // A managed non-insert link always has a snapshot.
        let Some(original) = &entry.original else {
            continue;
        };
        let document = entry
            .persister
            .dirty_check(&mut batch, &entry.object, original)?;
        outcome.snapshots.push((entry.key.clone(), document));
    }

    // Pass 2: inserts.
    for entry in entries {
        if entry.scheduled != ScheduledOperation::Insert {
            continue;
        }
        let document = entry.persister.insert(&mut batch, &entry.object)?;
        outcome.snapshots.push((entry.key.clone(), document));
    }

    // Pass 3: deletes.
    for entry in entries {
        if entry.scheduled != ScheduledOperation::Delete {
            continue;
        }
        entry.persister.remove(&mut batch, &entry.object)?;
        outcome.deleted.push(entry.key.clone());
    }

    Ok((batch, outcome))
}

/// Apply the outcome of a successful batch: store new snapshots, unlink
/// deletes (clearing their identities), and reset every scheduled
/// operation.
pub(crate) fn reconcile(
    state: &mut SessionState,
    outcome: FlushOutcome,
) -> Result<(), SessionError> {
    for (key, document) in outcome.snapshots {
        if let Some(link) = state.links.get_mut(&key) {
            link.original = Some(document);
        }
    }

    for key in outcome.deleted {
        state.links.unlink(&key)?;
    }

    for key in state.links.keys() {
        if let Some(link) = state.links.get_mut(&key) {
            link.scheduled = ScheduledOperation::None;
        }
    }

    Ok(())
}

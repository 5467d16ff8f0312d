//! Batch - ordered bulk operations produced by one flush.
//!
//! Persisters append operations; the flush planner owns the pass ordering
//! that keeps the op list grouped by kind (updates, then inserts, then
//! deletes), and a [`BatchExecutor`] submits the whole list in one call.

use crate::document::Document;
use crate::error::BatchError;

/// One datastore operation.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOp {
    Insert {
        collection: String,
        id: String,
        document: Document,
    },
    Update {
        collection: String,
        id: String,
        document: Document,
    },
    Delete {
        collection: String,
        id: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BatchOpKind {
    Insert,
    Update,
    Delete,
}

impl BatchOp {
    pub fn kind(&self) -> BatchOpKind {
        match self {
            BatchOp::Insert { .. } => BatchOpKind::Insert,
            BatchOp::Update { .. } => BatchOpKind::Update,
            BatchOp::Delete { .. } => BatchOpKind::Delete,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            BatchOp::Insert { collection, .. }
            | BatchOp::Update { collection, .. }
            | BatchOp::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BatchOp::Insert { id, .. } | BatchOp::Update { id, .. } | BatchOp::Delete { id, .. } => {
                id
            }
        }
    }
}

/// Ordered collection of operations submitted as one bulk write.
#[derive(Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_insert(&mut self, collection: impl Into<String>, id: impl Into<String>, document: Document) {
        self.ops.push(BatchOp::Insert {
            collection: collection.into(),
            id: id.into(),
            document,
        });
    }

    pub fn add_update(&mut self, collection: impl Into<String>, id: impl Into<String>, document: Document) {
        self.ops.push(BatchOp::Update {
            collection: collection.into(),
            id: id.into(),
            document,
        });
    }

    pub fn add_delete(&mut self, collection: impl Into<String>, id: impl Into<String>) {
        self.ops.push(BatchOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Submit the whole batch. An empty batch is a no-op.
    pub fn execute(&self, executor: &dyn BatchExecutor) -> Result<(), BatchError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        executor.execute(&self.ops)
    }
}

/// Datastore-side sink for a batch.
pub trait BatchExecutor: Send + Sync {
    fn execute(&self, ops: &[BatchOp]) -> Result<(), BatchError>;
}

//! Document - the persisted representation of an entity.

use serde_json::Value;

/// A document as stored in a collection. Snapshots held by the session for
/// dirty diffing use the same representation.
pub type Document = Value;

/// Well-known identity field of a document.
pub const ID_FIELD: &str = "_id";

/// Read the stringified identity out of a document, if present.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

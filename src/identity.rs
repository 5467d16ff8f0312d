//! Identity - opaque entity identifiers and their generators.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque entity identity. The stringified form is canonical: it keys the
/// session's identity table and the `_id` field of stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Wrap an already-validated identity string. Prefer going through an
    /// [`IdentityGenerator`] so the value is checked against the id scheme
    /// of the owning mapping.
    pub fn new(value: impl Into<String>) -> Self {
        Id(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces and validates identities for one entity mapping.
pub trait IdentityGenerator: Send + Sync {
    /// Generate a fresh identity.
    fn generate(&self) -> Id;

    /// Parse an identity from its string form. Returns None when the string
    /// is not a valid identifier under this generator's scheme.
    fn parse(&self, value: &str) -> Option<Id>;

    fn is_identifier(&self, value: &str) -> bool {
        self.parse(value).is_some()
    }
}

/// Default generator: random v4 UUIDs in hyphenated string form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdentityGenerator for UuidGenerator {
    fn generate(&self) -> Id {
        Id(Uuid::new_v4().to_string())
    }

    fn parse(&self, value: &str) -> Option<Id> {
        Uuid::parse_str(value).ok().map(|u| Id(u.to_string()))
    }
}

/// Generator that accepts any non-empty string. Useful for stores keyed by
/// natural ids and for fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueGenerator;

impl IdentityGenerator for OpaqueGenerator {
    fn generate(&self) -> Id {
        Id(Uuid::new_v4().to_string())
    }

    fn parse(&self, value: &str) -> Option<Id> {
        if value.is_empty() {
            None
        } else {
            Some(Id(value.to_string()))
        }
    }
}

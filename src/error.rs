use std::fmt;

/// Error raised by mapping readers/writers while converting between live
/// objects and documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    Serialize(String),
    Hydrate(String),
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::Serialize(msg) => write!(f, "document serialization failed: {}", msg),
            MappingError::Hydrate(msg) => write!(f, "document hydration failed: {}", msg),
        }
    }
}

impl std::error::Error for MappingError {}

/// Error raised by a persister while loading, diffing, or appending batch
/// operations for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersisterError {
    Mapping(MappingError),
    /// The backing store failed or returned an unusable row.
    Store(String),
    /// The entity reached the persister without an identity attribute.
    MissingIdentity(String),
    LockPoisoned(&'static str),
}

impl fmt::Display for PersisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersisterError::Mapping(err) => write!(f, "persister mapping error: {}", err),
            PersisterError::Store(msg) => write!(f, "persister store error: {}", msg),
            PersisterError::MissingIdentity(collection) => {
                write!(f, "entity for collection {} has no identity", collection)
            }
            PersisterError::LockPoisoned(operation) => {
                write!(f, "persister lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for PersisterError {}

impl From<MappingError> for PersisterError {
    fn from(err: MappingError) -> Self {
        PersisterError::Mapping(err)
    }
}

/// Error raised while executing a batch against the datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// An insert collided with an existing document id.
    DuplicateKey { collection: String, id: String },
    /// An update targeted a document that is not in the store.
    Missing { collection: String, id: String },
    Executor(String),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::DuplicateKey { collection, id } => {
                write!(f, "duplicate key {} in collection {}", id, collection)
            }
            BatchError::Missing { collection, id } => {
                write!(f, "no document {} in collection {}", id, collection)
            }
            BatchError::Executor(msg) => write!(f, "batch execution failed: {}", msg),
        }
    }
}

impl std::error::Error for BatchError {}

/// Error surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation targeted an object whose type has no registered mapping.
    Unmapped(String),
    /// The operation encountered an entity that has an identity but no link
    /// in this session.
    Detached(String),
    /// Two live objects with the same identity were linked in one session.
    DuplicateLink(String),
    /// An id string was rejected by the mapping's identity generator.
    InvalidIdentifier(String),
    /// The target of a reference could not be loaded.
    ReferenceResolution(String),
    Persister(PersisterError),
    Batch(BatchError),
    /// A previous flush failed; the session no longer accepts operations.
    Poisoned,
    LockPoisoned(&'static str),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Unmapped(name) => write!(f, "no mapping registered for {}", name),
            SessionError::Detached(id) => {
                write!(f, "entity {} is detached from this session", id)
            }
            SessionError::DuplicateLink(id) => {
                write!(f, "an entity with identity {} is already linked", id)
            }
            SessionError::InvalidIdentifier(value) => {
                write!(f, "invalid identifier: {}", value)
            }
            SessionError::ReferenceResolution(msg) => {
                write!(f, "reference could not be resolved: {}", msg)
            }
            SessionError::Persister(err) => write!(f, "persister error: {}", err),
            SessionError::Batch(err) => write!(f, "batch error: {}", err),
            SessionError::Poisoned => {
                write!(f, "session is poisoned by an earlier flush failure")
            }
            SessionError::LockPoisoned(operation) => {
                write!(f, "session lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<PersisterError> for SessionError {
    fn from(err: PersisterError) -> Self {
        SessionError::Persister(err)
    }
}

impl From<BatchError> for SessionError {
    fn from(err: BatchError) -> Self {
        SessionError::Batch(err)
    }
}

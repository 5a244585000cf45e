//! Error types for entry, query and type-registry operations.
//!
//! Every variant is local and recoverable: it is reported to the caller of
//! the offending operation and leaves the database usable. Query evaluation
//! and query-model maintenance never produce these errors.

use crate::entry::{EntryId, PropKey, ValueKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DbError {
    #[error("entry already exists: {entry_type} {location}")]
    DuplicateEntry { entry_type: String, location: String },

    #[error("property `{key}` is not defined for entry type `{entry_type}`")]
    UnknownProperty { key: PropKey, entry_type: String },

    #[error("property `{key}` holds {expected} values, got {actual}")]
    TypeMismatch {
        key: PropKey,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("property `{0}` is read-only")]
    ReadOnlyProperty(PropKey),

    #[error("entry {0} has been deleted")]
    EntryDeleted(EntryId),

    #[error("unknown entry {0}")]
    UnknownEntry(EntryId),

    #[error("unknown entry type: {0}")]
    UnknownEntryType(String),

    #[error("entry type `{0}` is already registered with a different definition")]
    TypeConflict(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedQuery(message.into())
    }
}

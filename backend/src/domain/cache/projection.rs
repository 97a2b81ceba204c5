//! Strategy deciding how documents are indexed, partitioned and derived.

use serde_json::Value;

use crate::domain::Document;

/// A document could not be turned into its cached form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DeriveError {
    message: String,
}

impl DeriveError {
    /// Build an error with a human-readable reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parameterizes a [`ReactiveCache`](super::ReactiveCache) for one collection.
///
/// `index` and `tenant` read raw record fields so that delete events, which
/// carry only a subset of the record, can still be resolved to an entry.
pub trait CacheProjection: Send + Sync + 'static {
    /// Object stored in the primary table.
    type Derived: Send + Sync + 'static;

    /// Backing collection name.
    fn collection(&self) -> &str;

    /// Index value for a record, or `None` when the record cannot be indexed.
    fn index(&self, record: &Value) -> Option<String>;

    /// Tenant partition for a record. Flat caches return `None`.
    fn tenant(&self, _record: &Value) -> Option<String> {
        None
    }

    /// Build the cached object from a raw document.
    fn derive(&self, document: &Document) -> Result<Self::Derived, DeriveError>;
}

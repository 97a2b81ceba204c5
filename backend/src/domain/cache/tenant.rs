//! Tenant-partitioned projection for per-organization policy documents.

use serde_json::Value;

use super::{CacheProjection, DeriveError};
use crate::domain::document::{ORG_ID_FIELD, str_field};
use crate::domain::Document;

/// Caches documents of one collection partitioned by `orgId`.
///
/// Entries are indexed by `index_field` and kept verbatim, so callers such as
/// dial-plan or notification-policy lookups read whichever fields they need.
///
/// # Examples
/// ```
/// use acs_backend::domain::cache::{CacheProjection, TenantDocumentProjection};
/// use serde_json::json;
///
/// let projection = TenantDocumentProjection::new("dial-plans", "name");
/// let record = json!({ "_id": "d1", "orgId": "org-1", "name": "default" });
/// assert_eq!(projection.index(&record).as_deref(), Some("org-1~default"));
/// assert_eq!(projection.tenant(&record).as_deref(), Some("org-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDocumentProjection {
    collection: String,
    index_field: String,
}

impl TenantDocumentProjection {
    /// Partition `collection` by organization, indexing on `index_field`.
    pub fn new(collection: impl Into<String>, index_field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            index_field: index_field.into(),
        }
    }

    /// Primary-table key for `name` inside organization `org_id`.
    pub fn compose_index(org_id: &str, name: &str) -> String {
        format!("{org_id}~{name}")
    }
}

impl CacheProjection for TenantDocumentProjection {
    type Derived = Document;

    fn collection(&self) -> &str {
        &self.collection
    }

    // Primary keys are qualified by tenant so equal names in two
    // organizations do not collide.
    fn index(&self, record: &Value) -> Option<String> {
        let org_id = str_field(record, ORG_ID_FIELD)?;
        let name = str_field(record, &self.index_field)?;
        Some(Self::compose_index(org_id, name))
    }

    fn tenant(&self, record: &Value) -> Option<String> {
        str_field(record, ORG_ID_FIELD).map(str::to_owned)
    }

    fn derive(&self, document: &Document) -> Result<Self::Derived, DeriveError> {
        if document.str_field(ORG_ID_FIELD).is_none() {
            return Err(DeriveError::new("record has no orgId"));
        }
        Ok(document.clone())
    }
}

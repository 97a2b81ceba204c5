//! In-memory tables backing a reactive cache.
//!
//! `primary` holds exactly one entry per index. Each entry remembers the
//! document id that owns it, so removing a document never evicts an entry a
//! newer document has since claimed. A document that loses its index also
//! loses its `raw` entry, so the next reconciliation derives it again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::Document;

struct Entry<D> {
    id: String,
    value: Arc<D>,
}

struct Slot {
    index: String,
    tenant: Option<String>,
}

pub(super) struct Tables<D> {
    raw: HashMap<String, Document>,
    slots: HashMap<String, Slot>,
    primary: HashMap<String, Entry<D>>,
    per_tenant: HashMap<String, BTreeMap<String, Arc<D>>>,
}

impl<D> Default for Tables<D> {
    fn default() -> Self {
        Self {
            raw: HashMap::new(),
            slots: HashMap::new(),
            primary: HashMap::new(),
            per_tenant: HashMap::new(),
        }
    }
}

impl<D> Tables<D> {
    pub(super) fn get(&self, index: &str) -> Option<Arc<D>> {
        self.primary.get(index).map(|entry| Arc::clone(&entry.value))
    }

    pub(super) fn get_in_tenant(&self, tenant: &str, index: &str) -> Option<Arc<D>> {
        self.per_tenant.get(tenant)?.get(index).cloned()
    }

    pub(super) fn tenant_entries(&self, tenant: &str) -> Vec<(String, Arc<D>)> {
        self.per_tenant
            .get(tenant)
            .map(|partition| {
                partition
                    .iter()
                    .map(|(index, value)| (index.clone(), Arc::clone(value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(super) fn tenant_count(&self) -> usize {
        self.per_tenant.len()
    }

    pub(super) fn values(&self) -> Vec<Arc<D>> {
        self.primary
            .values()
            .map(|entry| Arc::clone(&entry.value))
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.primary.len()
    }

    pub(super) fn raw(&self, id: &str) -> Option<&Document> {
        self.raw.get(id)
    }

    pub(super) fn raw_matches(&self, document: &Document) -> bool {
        self.raw.get(document.id()) == Some(document)
    }

    pub(super) fn ids_missing_from(&self, snapshot: &HashMap<String, Document>) -> Vec<String> {
        self.raw
            .keys()
            .filter(|id| !snapshot.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Index the document currently owns, if it owns one.
    pub(super) fn index_of(&self, id: &str) -> Option<&str> {
        self.slots.get(id).map(|slot| slot.index.as_str())
    }

    pub(super) fn id_for_index(&self, index: &str) -> Option<String> {
        self.primary.get(index).map(|entry| entry.id.clone())
    }

    pub(super) fn upsert(
        &mut self,
        document: Document,
        index: String,
        tenant: Option<String>,
        value: D,
    ) {
        let id = document.id().to_owned();
        self.detach(&id);
        if let Some(owner) = self.id_for_index(&index) {
            self.detach(&owner);
            self.raw.remove(&owner);
        }

        let value = Arc::new(value);
        if let Some(tenant) = &tenant {
            self.per_tenant
                .entry(tenant.clone())
                .or_default()
                .insert(index.clone(), Arc::clone(&value));
        }
        self.primary.insert(
            index.clone(),
            Entry {
                id: id.clone(),
                value,
            },
        );
        self.slots.insert(id.clone(), Slot { index, tenant });
        self.raw.insert(id, document);
    }

    /// Remove a document and whatever entry it owns. Returns whether it was known.
    pub(super) fn remove_id(&mut self, id: &str) -> bool {
        let owned = self.detach(id);
        self.raw.remove(id).is_some() || owned
    }

    fn detach(&mut self, id: &str) -> bool {
        let Some(slot) = self.slots.remove(id) else {
            return false;
        };
        if self
            .primary
            .get(&slot.index)
            .is_some_and(|entry| entry.id == id)
        {
            self.primary.remove(&slot.index);
        }
        if let Some(tenant) = slot.tenant {
            let now_empty = self.per_tenant.get_mut(&tenant).is_some_and(|partition| {
                partition.remove(&slot.index);
                partition.is_empty()
            });
            if now_empty {
                self.per_tenant.remove(&tenant);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document::new(id, json!({ "v": id }))
    }

    #[rstest]
    fn index_collision_keeps_latest_owner() {
        let mut tables = Tables::default();
        tables.upsert(doc("a"), "shared".to_owned(), None, 1_u32);
        tables.upsert(doc("b"), "shared".to_owned(), None, 2_u32);

        assert_eq!(tables.len(), 1);
        assert_eq!(tables.get("shared").as_deref(), Some(&2));

        assert!(tables.raw("a").is_none());
        assert!(tables.index_of("a").is_none());
        assert_eq!(tables.index_of("b"), Some("shared"));

        tables.remove_id("a");
        assert_eq!(tables.get("shared").as_deref(), Some(&2));
    }

    #[rstest]
    fn reindexing_a_document_drops_its_old_index() {
        let mut tables = Tables::default();
        tables.upsert(doc("a"), "old".to_owned(), None, 1_u32);
        tables.upsert(doc("a"), "new".to_owned(), None, 1_u32);

        assert!(tables.get("old").is_none());
        assert!(tables.get("new").is_some());
    }

    #[rstest]
    fn empty_tenant_partition_is_dropped() {
        let mut tables = Tables::default();
        tables.upsert(doc("a"), "x".to_owned(), Some("org-1".to_owned()), 1_u32);
        tables.upsert(doc("b"), "y".to_owned(), Some("org-1".to_owned()), 2_u32);
        assert_eq!(tables.tenant_count(), 1);

        tables.remove_id("a");
        assert_eq!(tables.tenant_entries("org-1").len(), 1);
        tables.remove_id("b");
        assert_eq!(tables.tenant_count(), 0);
    }
}

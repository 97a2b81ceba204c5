//! Generic local cache kept consistent with a document collection.
//!
//! Two independent paths mutate the same tables:
//!
//! - the event path applies change notifications as they arrive;
//! - the reconciliation path re-reads the whole collection on a randomized
//!   interval and diffs the snapshot against the raw documents it holds.
//!
//! Reconciliation heals any drift the event path missed. A snapshot query
//! that fails or times out leaves the tables untouched.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::StreamExt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::ports::{ChangeStream, DocumentCollection, DocumentCollectionError};
use crate::domain::{ChangeEvent, CrudType, Document, Sleeper};

mod projection;
mod tables;
mod tenant;

pub use projection::{CacheProjection, DeriveError};
pub use tenant::TenantDocumentProjection;

use tables::Tables;

/// Timing for periodic reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Shortest delay between two reconciliations.
    pub min_interval: Duration,
    /// Longest delay between two reconciliations.
    pub max_interval: Duration,
    /// Upper bound on one snapshot query.
    pub query_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(10 * 60),
            max_interval: Duration::from_secs(20 * 60),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl ReconcileConfig {
    /// Draw the next reconciliation delay uniformly from the configured bounds.
    pub fn next_interval(&self, rng: &mut impl Rng) -> Duration {
        let low = u64::try_from(self.min_interval.as_millis()).unwrap_or(u64::MAX);
        let high = u64::try_from(self.max_interval.as_millis()).unwrap_or(u64::MAX);
        if high <= low {
            return self.min_interval;
        }
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

/// Why a reconciliation left the cache unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// The snapshot query exceeded its timeout.
    #[error("snapshot query timed out after {0:?}")]
    Timeout(Duration),
    /// The snapshot query failed.
    #[error(transparent)]
    Query(#[from] DocumentCollectionError),
}

/// Counts from one applied reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Documents dropped because the snapshot no longer contains them.
    pub removed: usize,
    /// Documents newly derived or re-derived after a change.
    pub upserted: usize,
    /// Documents skipped because derivation failed.
    pub rejected: usize,
    /// Documents left out because an unchanged record holds their index.
    pub shadowed: usize,
}

/// Result of applying one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The record was derived and stored.
    Upserted,
    /// The record failed derivation and is no longer cached.
    Rejected,
    /// A point delete removed a cached record.
    Removed,
    /// A point delete named a record the cache does not hold.
    Unknown,
    /// A delete without an index forced a full reconciliation.
    Reconciled,
    /// The event could not be interpreted and was dropped.
    Dropped,
}

/// Reconciling in-memory mirror of one collection.
///
/// # Examples
/// ```ignore
/// let cache = ReactiveCache::load(projection, collection, ReconcileConfig::default()).await;
/// let authenticator = cache.get("http://acs.example.net/cwmp");
/// ```
pub struct ReactiveCache<P: CacheProjection> {
    projection: P,
    source: Arc<dyn DocumentCollection>,
    config: ReconcileConfig,
    tables: RwLock<Tables<P::Derived>>,
}

impl<P: CacheProjection> ReactiveCache<P> {
    /// Build the cache and perform the initial full load.
    ///
    /// A failed initial load is logged and leaves the cache empty; the next
    /// reconciliation retries it.
    pub async fn load(
        projection: P,
        source: Arc<dyn DocumentCollection>,
        config: ReconcileConfig,
    ) -> Self {
        let cache = Self {
            projection,
            source,
            config,
            tables: RwLock::new(Tables::default()),
        };
        match cache.reconcile().await {
            Ok(report) => info!(
                collection = cache.collection(),
                entries = cache.len(),
                rejected = report.rejected,
                "cache loaded"
            ),
            Err(error) => warn!(
                collection = cache.collection(),
                error = %error,
                "initial cache load failed; starting empty"
            ),
        }
        cache
    }

    /// Name of the mirrored collection.
    pub fn collection(&self) -> &str {
        self.projection.collection()
    }

    /// Projection strategy in use.
    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Look up a derived object by index.
    pub fn get(&self, index: &str) -> Option<Arc<P::Derived>> {
        self.read().get(index)
    }

    /// Look up a derived object inside one tenant partition.
    pub fn get_in_tenant(&self, tenant: &str, index: &str) -> Option<Arc<P::Derived>> {
        self.read().get_in_tenant(tenant, index)
    }

    /// Entries of one tenant partition, ordered by index.
    pub fn tenant_entries(&self, tenant: &str) -> Vec<(String, Arc<P::Derived>)> {
        self.read().tenant_entries(tenant)
    }

    /// Number of non-empty tenant partitions.
    pub fn tenant_count(&self) -> usize {
        self.read().tenant_count()
    }

    /// Every derived object currently cached.
    pub fn values(&self) -> Vec<Arc<P::Derived>> {
        self.read().values()
    }

    /// Number of entries in the primary table.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw document last applied under `id`.
    pub fn raw(&self, id: &str) -> Option<Document> {
        self.read().raw(id).cloned()
    }

    /// Decode and apply one message from the change channel.
    pub async fn handle_message(&self, message: Value) -> EventOutcome {
        match ChangeEvent::decode(message) {
            Ok(event) => self.apply_event(event).await,
            Err(error) => {
                warn!(collection = self.collection(), error = %error, "dropping change event");
                EventOutcome::Dropped
            }
        }
    }

    /// Apply one change event.
    pub async fn apply_event(&self, event: ChangeEvent) -> EventOutcome {
        match event.crud_type {
            CrudType::Create | CrudType::Update => match Document::from_value(event.record) {
                Ok(document) => self.upsert(document),
                Err(error) => {
                    warn!(collection = self.collection(), error = %error, "dropping change event");
                    EventOutcome::Dropped
                }
            },
            CrudType::Delete => self.delete(&event).await,
        }
    }

    async fn delete(&self, event: &ChangeEvent) -> EventOutcome {
        if let Some(id) = event.document_id() {
            return self.remove(&id);
        }
        if let Some(index) = self.projection.index(&event.record) {
            let owner = self.read().id_for_index(&index);
            return match owner {
                Some(id) => self.remove(&id),
                None => EventOutcome::Unknown,
            };
        }

        info!(
            collection = self.collection(),
            "delete event without index; reconciling"
        );
        if let Err(error) = self.reconcile().await {
            warn!(collection = self.collection(), error = %error, "reconciliation failed");
        }
        EventOutcome::Reconciled
    }

    fn remove(&self, id: &str) -> EventOutcome {
        let removed = self.write().remove_id(id);
        if removed {
            debug!(collection = self.collection(), id, "cache entry deleted");
            EventOutcome::Removed
        } else {
            EventOutcome::Unknown
        }
    }

    fn upsert(&self, document: Document) -> EventOutcome {
        match self.project(&document) {
            Ok((index, tenant, value)) => {
                debug!(
                    collection = self.collection(),
                    id = document.id(),
                    index = %index,
                    "cache entry upserted"
                );
                self.write().upsert(document, index, tenant, value);
                EventOutcome::Upserted
            }
            Err(error) => {
                warn!(
                    collection = self.collection(),
                    id = document.id(),
                    error = %error,
                    "skipping record that failed derivation"
                );
                self.write().remove_id(document.id());
                EventOutcome::Rejected
            }
        }
    }

    /// Re-read the whole collection and diff it against the cached documents.
    ///
    /// # Errors
    /// Returns [`ReconcileError`] when the snapshot query fails or times out;
    /// the tables are left exactly as they were.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let documents = tokio::time::timeout(
            self.config.query_timeout,
            self.source.load_all(self.collection()),
        )
        .await
        .map_err(|_elapsed| ReconcileError::Timeout(self.config.query_timeout))??;

        let snapshot: HashMap<String, Document> = documents
            .into_iter()
            .map(|document| (document.id().to_owned(), document))
            .collect();
        let report = self.apply_snapshot(snapshot);
        debug!(
            collection = self.collection(),
            removed = report.removed,
            upserted = report.upserted,
            rejected = report.rejected,
            shadowed = report.shadowed,
            "reconciliation applied"
        );
        Ok(report)
    }

    fn apply_snapshot(&self, snapshot: HashMap<String, Document>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut tables = self.write();

        for id in tables.ids_missing_from(&snapshot) {
            tables.remove_id(&id);
            report.removed += 1;
        }

        // Unchanged documents keep their index; anything else may only take
        // an index nobody in the snapshot still holds.
        let (unchanged, changed): (Vec<Document>, Vec<Document>) = snapshot
            .into_values()
            .partition(|document| tables.raw_matches(document));
        let mut claimed: HashSet<String> = unchanged
            .iter()
            .filter_map(|document| tables.index_of(document.id()).map(str::to_owned))
            .collect();

        for document in changed {
            match self.project(&document) {
                Ok((index, _, _)) if claimed.contains(&index) => {
                    debug!(
                        collection = self.collection(),
                        id = document.id(),
                        index = %index,
                        "index held by another record; deferring"
                    );
                    tables.remove_id(document.id());
                    report.shadowed += 1;
                }
                Ok((index, tenant, value)) => {
                    claimed.insert(index.clone());
                    tables.upsert(document, index, tenant, value);
                    report.upserted += 1;
                }
                Err(error) => {
                    warn!(
                        collection = self.collection(),
                        id = document.id(),
                        error = %error,
                        "skipping record that failed derivation"
                    );
                    tables.remove_id(document.id());
                    report.rejected += 1;
                }
            }
        }
        report
    }

    fn project(
        &self,
        document: &Document,
    ) -> Result<(String, Option<String>, P::Derived), DeriveError> {
        let index = self
            .projection
            .index(document.body())
            .ok_or_else(|| DeriveError::new("record has no index value"))?;
        let value = self.projection.derive(document)?;
        Ok((index, self.projection.tenant(document.body()), value))
    }

    /// Drive both update paths until `shutdown` fires.
    ///
    /// Events are applied in delivery order. When the feed closes, the cache
    /// keeps going on reconciliation alone.
    pub async fn run(
        self: Arc<Self>,
        mut events: Option<ChangeStream>,
        sleeper: Arc<dyn Sleeper>,
        shutdown: CancellationToken,
    ) {
        let mut rng = SmallRng::from_entropy();
        let mut tick = sleeper.sleep(self.config.next_interval(&mut rng));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                message = next_message(&mut events) => match message {
                    Some(message) => {
                        self.handle_message(message).await;
                    }
                    None => {
                        warn!(collection = self.collection(), "change feed closed; relying on reconciliation");
                        events = None;
                    }
                },
                () = &mut tick => {
                    if let Err(error) = self.reconcile().await {
                        warn!(collection = self.collection(), error = %error, "reconciliation failed; keeping previous state");
                    }
                    tick = sleeper.sleep(self.config.next_interval(&mut rng));
                }
            }
        }
        debug!(collection = self.collection(), "cache driver stopped");
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables<P::Derived>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables<P::Derived>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn next_message(events: &mut Option<ChangeStream>) -> Option<Value> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

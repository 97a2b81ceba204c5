//! In-memory backing collections and change feed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use super::lock;
use crate::domain::Document;
use crate::domain::ports::{
    ChangeFeed, ChangeFeedError, ChangeStream, DocumentCollection, DocumentCollectionError,
};

/// Document store holding collections in memory.
#[derive(Default)]
pub struct InMemoryDocumentCollection {
    collections: Mutex<HashMap<String, BTreeMap<String, Document>>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    queries: AtomicUsize,
}

impl InMemoryDocumentCollection {
    pub fn insert(&self, collection: &str, document: Document) {
        lock(&self.collections)
            .entry(collection.to_owned())
            .or_default()
            .insert(document.id().to_owned(), document);
    }

    pub fn remove(&self, collection: &str, id: &str) {
        if let Some(documents) = lock(&self.collections).get_mut(collection) {
            documents.remove(id);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every query for `delay` of tokio time.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Number of `load_all` calls so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentCollection for InMemoryDocumentCollection {
    async fn load_all(&self, collection: &str) -> Result<Vec<Document>, DocumentCollectionError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DocumentCollectionError::query("store offline"));
        }
        Ok(lock(&self.collections)
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Change feed fanning published messages out to every subscriber.
#[derive(Default)]
pub struct InMemoryChangeFeed {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl InMemoryChangeFeed {
    pub fn publish(&self, collection: &str, message: Value) {
        if let Some(senders) = lock(&self.subscribers).get_mut(collection) {
            senders.retain(|sender| sender.send(message.clone()).is_ok());
        }
    }

    /// Drop every subscription, ending their streams.
    pub fn close(&self) {
        lock(&self.subscribers).clear();
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn subscribe(&self, collection: &str) -> Result<ChangeStream, ChangeFeedError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers)
            .entry(collection.to_owned())
            .or_default()
            .push(sender);
        Ok(futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        })
        .boxed())
    }
}

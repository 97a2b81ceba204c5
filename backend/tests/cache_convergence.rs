//! The organization cache converges on the backing collection whatever the
//! event stream said in between.

use std::sync::Arc;
use std::time::Duration;

use acs_backend::domain::cache::{ReactiveCache, ReconcileConfig};
use acs_backend::domain::ports::ChangeFeed;
use acs_backend::domain::{
    AuthenticatorCache, Document, ORGANIZATIONS_COLLECTION, OrganizationProjection, TokioSleeper,
};
use acs_backend::test_support::{InMemoryChangeFeed, InMemoryDocumentCollection};
use rstest::rstest;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn org(id: &str, url: &str) -> Value {
    json!({ "_id": id, "url": url, "acsUsername": id, "acsPassword": format!("{id}-pw") })
}

fn store(documents: &InMemoryDocumentCollection, record: Value) {
    documents.insert(
        ORGANIZATIONS_COLLECTION,
        Document::from_value(record).expect("document"),
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stale_and_garbled_events_are_corrected_by_reconciliation() {
    let documents = Arc::new(InMemoryDocumentCollection::default());
    store(&documents, org("acme", "http://acs.acme.net/cwmp"));
    store(&documents, org("globex", "http://acs.globex.net/cwmp"));
    let cache = Arc::new(
        ReactiveCache::load(
            OrganizationProjection::new("acs"),
            documents.clone(),
            ReconcileConfig::default(),
        )
        .await,
    );
    let authenticators = AuthenticatorCache::new(cache.clone());
    assert_eq!(cache.len(), 2);

    let feed = InMemoryChangeFeed::default();
    let events = feed
        .subscribe(ORGANIZATIONS_COLLECTION)
        .await
        .expect("subscription");
    let shutdown = CancellationToken::new();
    let driver = tokio::spawn(cache.clone().run(
        Some(events),
        Arc::new(TokioSleeper),
        shutdown.clone(),
    ));

    // The backing store moves on: globex leaves, initech joins, and a broken
    // record appears. Events describe only part of that, some of it wrongly.
    documents.remove(ORGANIZATIONS_COLLECTION, "globex");
    store(&documents, org("initech", "http://acs.initech.net/cwmp"));
    store(&documents, json!({ "_id": "broken", "url": "http://acs.broken.net/cwmp" }));
    let mut stale = org("acme", "http://acs.acme.net/old");
    stale["crudType"] = json!("Update");
    feed.publish(ORGANIZATIONS_COLLECTION, stale);
    feed.publish(ORGANIZATIONS_COLLECTION, json!({ "crudType": "Explode", "_id": "x" }));
    feed.publish(ORGANIZATIONS_COLLECTION, json!("not an object"));

    tokio::time::sleep(Duration::from_secs(21 * 60)).await;

    assert_eq!(cache.len(), 2);
    assert_eq!(
        authenticators
            .lookup("http://acs.acme.net/cwmp", "/cwmp")
            .map(|a| a.org_id().to_owned()),
        Some("acme".to_owned())
    );
    assert!(authenticators.by_org_id("initech").is_some());
    assert!(authenticators.by_org_id("globex").is_none());
    assert!(authenticators.by_org_id("broken").is_none());

    shutdown.cancel();
    driver.await.expect("driver stops");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn closed_feed_leaves_reconciliation_running() {
    let documents = Arc::new(InMemoryDocumentCollection::default());
    let cache = Arc::new(
        ReactiveCache::load(
            OrganizationProjection::new("acs"),
            documents.clone(),
            ReconcileConfig::default(),
        )
        .await,
    );
    let feed = InMemoryChangeFeed::default();
    let events = feed
        .subscribe(ORGANIZATIONS_COLLECTION)
        .await
        .expect("subscription");
    let shutdown = CancellationToken::new();
    let driver = tokio::spawn(cache.clone().run(
        Some(events),
        Arc::new(TokioSleeper),
        shutdown.clone(),
    ));

    feed.close();
    store(&documents, org("acme", "http://acs.acme.net/cwmp"));
    tokio::time::sleep(Duration::from_secs(21 * 60)).await;

    assert_eq!(cache.len(), 1);
    shutdown.cancel();
    driver.await.expect("driver stops");
}

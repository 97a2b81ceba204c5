//! Routing tests over a real worker pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rstest::{fixture, rstest};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::domain::cache::{ReactiveCache, ReconcileConfig};
use crate::domain::http_auth::{DEFAULT_REALM, basic};
use crate::domain::ports::{FixtureSessionOwner, SessionOwner};
use crate::domain::{
    AuthenticatorCache, Credentials, Document, ORGANIZATIONS_COLLECTION, OrganizationProjection,
};
use crate::test_support::InMemoryDocumentCollection;

/// Echoes which worker handled the request and what it was told.
struct EchoOwner;

#[async_trait]
impl SessionOwner for EchoOwner {
    async fn handle(&mut self, context: &SessionContext, request: SessionRequest) -> SessionReply {
        let body = json!({
            "worker": context.worker_index,
            "org": request.org_id,
            "zeroTouch": request.zero_touch,
            "device": request.cookie.map(|cookie| cookie.device_id),
        });
        SessionReply::ok(Some(body.to_string()))
    }
}

/// Never answers.
struct StalledOwner;

#[async_trait]
impl SessionOwner for StalledOwner {
    async fn handle(&mut self, _context: &SessionContext, _request: SessionRequest) -> SessionReply {
        std::future::pending::<SessionReply>().await
    }
}

async fn authenticators() -> AuthenticatorCache {
    let store = Arc::new(InMemoryDocumentCollection::default());
    for (id, url) in [
        ("acme", "https://acs.acme.net/cwmp"),
        ("globex", "https://acs.globex.net/globex"),
    ] {
        store.insert(
            ORGANIZATIONS_COLLECTION,
            Document::from_value(json!({
                "_id": id,
                "url": url,
                "acsUsername": id,
                "acsPassword": format!("{id}-secret"),
            }))
            .expect("document"),
        );
    }
    let cache = ReactiveCache::load(
        OrganizationProjection::new(DEFAULT_REALM),
        store,
        ReconcileConfig::default(),
    )
    .await;
    AuthenticatorCache::new(Arc::new(cache))
}

fn pool(owners: Vec<Box<dyn SessionOwner>>, timeout: Duration) -> Arc<SessionDispatcher> {
    let config = DispatchConfig {
        timeout,
        hostname: "acs-test".to_owned(),
        ..DispatchConfig::default()
    };
    Arc::new(
        SessionDispatcher::spawn(owners, &config, &CancellationToken::new()).expect("workers"),
    )
}

fn echo_pool(size: usize) -> Arc<SessionDispatcher> {
    let owners = (0..size)
        .map(|_| Box::new(EchoOwner) as Box<dyn SessionOwner>)
        .collect();
    pool(owners, Duration::from_secs(300))
}

#[fixture]
fn zero_touch() -> Option<Credentials> {
    Some(Credentials::new("zero-touch", "activate-cxnk"))
}

fn first_request(authorization: Option<String>) -> InboundRequest {
    InboundRequest {
        scheme: "https".to_owned(),
        host: Some("acs.acme.net".to_owned()),
        path: "/cwmp".to_owned(),
        authorization,
        cookie: None,
        body: Some(b"<Inform/>".to_vec()),
    }
}

fn delivered_body(outcome: RouteOutcome) -> serde_json::Value {
    match outcome {
        RouteOutcome::Delivered(reply) => {
            serde_json::from_str(reply.body.as_deref().expect("body")).expect("json body")
        }
        other => panic!("expected delivery, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn org_credentials_reach_a_worker(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(4), zero_touch);

    let outcome = router
        .route(first_request(Some(basic::authorization("acme", "acme-secret"))))
        .await;

    let body = delivered_body(outcome);
    assert_eq!(body["org"], "acme");
    assert_eq!(body["zeroTouch"], false);
}

#[rstest]
#[tokio::test]
async fn bootstrap_credentials_are_flagged(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(2), zero_touch);

    let outcome = router
        .route(first_request(Some(basic::authorization("zero-touch", "activate-cxnk"))))
        .await;

    assert_eq!(delivered_body(outcome)["zeroTouch"], true);
}

#[rstest]
#[tokio::test]
async fn bootstrap_credentials_are_refused_when_disabled() {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(2), None);

    let outcome = router
        .route(first_request(Some(basic::authorization("zero-touch", "activate-cxnk"))))
        .await;

    assert!(matches!(
        outcome,
        RouteOutcome::Rejected(Rejection::Unauthorized { .. })
    ));
}

#[rstest]
#[case::missing(None)]
#[case::wrong(Some(basic::authorization("acme", "guess")))]
#[tokio::test]
async fn bad_credentials_get_a_challenge(
    zero_touch: Option<Credentials>,
    #[case] authorization: Option<String>,
) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(2), zero_touch);

    let outcome = router.route(first_request(authorization)).await;

    assert_eq!(
        outcome,
        RouteOutcome::Rejected(Rejection::Unauthorized {
            challenge: "Basic realm=\"acs\"".to_owned(),
        })
    );
}

#[rstest]
#[tokio::test]
async fn unknown_url_is_forbidden(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(2), zero_touch);
    let mut request = first_request(Some(basic::authorization("acme", "acme-secret")));
    request.path = "/elsewhere".to_owned();

    let outcome = router.route(request).await;

    let RouteOutcome::Rejected(rejection) = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.status(), 403);
    assert_eq!(rejection.reason(), "Invalid ACS URL");
}

#[rstest]
#[tokio::test]
async fn hostless_requests_fall_back_to_path(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(2), zero_touch);
    let mut request = first_request(Some(basic::authorization("globex", "globex-secret")));
    request.host = None;
    request.path = "/globex/".to_owned();

    assert_eq!(delivered_body(router.route(request).await)["org"], "globex");
}

#[rstest]
#[tokio::test]
async fn new_exchanges_rotate_through_workers(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(3), zero_touch);

    let mut workers = Vec::new();
    for _ in 0..6 {
        let outcome = router
            .route(first_request(Some(basic::authorization("acme", "acme-secret"))))
            .await;
        workers.push(delivered_body(outcome)["worker"].as_u64().expect("index"));
    }

    assert_eq!(workers[0..3], workers[3..6]);
    let mut distinct = workers[0..3].to_vec();
    distinct.sort_unstable();
    assert_eq!(distinct, vec![0, 1, 2]);
}

#[rstest]
#[tokio::test]
async fn cookie_requests_stick_to_their_worker(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(4), zero_touch);
    let context = SessionContext {
        worker_index: 2,
        hostname: "acs-test".to_owned(),
    };
    let cookie = SessionCookie::issue("D1", &context, Utc::now()).encode();

    for _ in 0..5 {
        let outcome = router
            .route(InboundRequest {
                cookie: Some(cookie.clone()),
                path: "/anything".to_owned(),
                ..InboundRequest::default()
            })
            .await;
        let body = delivered_body(outcome);
        assert_eq!(body["worker"], 2);
        assert_eq!(body["device"], "D1");
        assert_eq!(body["org"], serde_json::Value::Null);
    }
}

#[rstest]
#[tokio::test]
async fn undecodable_cookie_is_a_bad_request(zero_touch: Option<Credentials>) {
    let router = StickySessionRouter::new(authenticators().await, echo_pool(2), zero_touch);

    let outcome = router
        .route(InboundRequest {
            cookie: Some("not-a-cookie!".to_owned()),
            ..first_request(None)
        })
        .await;

    let RouteOutcome::Rejected(rejection) = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.status(), 400);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_worker_becomes_a_fault(zero_touch: Option<Credentials>) {
    let dispatcher = pool(vec![Box::new(StalledOwner)], Duration::from_secs(300));
    let router = StickySessionRouter::new(authenticators().await, dispatcher, zero_touch);

    let outcome = router
        .route(first_request(Some(basic::authorization("acme", "acme-secret"))))
        .await;

    assert_eq!(
        outcome,
        RouteOutcome::Fault(DispatchError::Timeout(Duration::from_secs(300)))
    );
}

#[rstest]
#[tokio::test]
async fn fixture_owner_binds_then_ends_the_session(zero_touch: Option<Credentials>) {
    let dispatcher = pool(vec![Box::new(FixtureSessionOwner::default())], Duration::from_secs(5));
    let router = StickySessionRouter::new(authenticators().await, dispatcher, zero_touch);

    let RouteOutcome::Delivered(first) = router
        .route(first_request(Some(basic::authorization("acme", "acme-secret"))))
        .await
    else {
        panic!("expected delivery");
    };
    let cookie = first.cookie.expect("session cookie issued");
    assert_eq!(SessionCookie::decode(&cookie, 1).map(|c| c.device_id), Ok("acme-0-1".to_owned()));

    let RouteOutcome::Delivered(last) = router
        .route(InboundRequest {
            cookie: Some(cookie),
            body: None,
            ..first_request(None)
        })
        .await
    else {
        panic!("expected delivery");
    };
    assert_eq!(last, SessionReply::no_content());
}

#[rstest]
#[tokio::test]
async fn empty_pool_is_refused() {
    let result = SessionDispatcher::spawn(Vec::new(), &DispatchConfig::default(), &CancellationToken::new());
    assert!(matches!(result, Err(DispatchError::NoWorkers)));
}

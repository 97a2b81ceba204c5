//! HTTP surface tests over real routing and a scripted device.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::{StatusCode, header};
use actix_web::{App, dev::ServiceResponse, web};
use chrono::{TimeZone, Utc};
use rstest::rstest;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::connection_requests::wake_device;
use super::cwmp::cwmp_entry;
use super::json_config;
use super::state::HttpState;
use crate::domain::cache::{ReactiveCache, ReconcileConfig};
use crate::domain::http_auth::{DEFAULT_REALM, basic};
use crate::domain::ports::{DeviceResponse, FixtureSessionOwner, SessionOwner};
use crate::domain::session::{DispatchConfig, SessionDispatcher, StickySessionRouter};
use crate::domain::{
    AuthenticatorCache, ConnectionRequestConfig, ConnectionRequestEngine, ConnectionRequestPorts,
    ConnectionRequestRuntime, Credentials, Document, ORGANIZATIONS_COLLECTION,
    OrganizationProjection,
};
use crate::test_support::{
    ImmediateSleeper, InMemoryDocumentCollection, InMemoryTicketStore, MutableClock,
    RecordingCommunicationLog, ScriptedDeviceTransport,
};

struct Fixture {
    state: HttpState,
    transport: Arc<ScriptedDeviceTransport>,
}

async fn fixture(transport: ScriptedDeviceTransport, owners: Vec<Box<dyn SessionOwner>>) -> Fixture {
    let documents = Arc::new(InMemoryDocumentCollection::default());
    documents.insert(
        ORGANIZATIONS_COLLECTION,
        Document::from_value(json!({
            "_id": "acme",
            "url": "https://acs.acme.net/cwmp",
            "acsUsername": "acme",
            "acsPassword": "acme-secret",
            "cpeUsername": "cpe-user",
            "cpePassword": "cpe-secret",
        }))
        .expect("document"),
    );
    let cache = ReactiveCache::load(
        OrganizationProjection::new(DEFAULT_REALM),
        documents,
        ReconcileConfig::default(),
    )
    .await;
    let authenticators = AuthenticatorCache::new(Arc::new(cache));

    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("timestamp"),
    ));
    let transport = Arc::new(transport);
    let engine = ConnectionRequestEngine::new(
        ConnectionRequestPorts {
            store: Arc::new(InMemoryTicketStore::new(clock.clone())),
            transport: transport.clone(),
            communication_log: Arc::new(RecordingCommunicationLog::default()),
            observers: Vec::new(),
        },
        ConnectionRequestRuntime {
            clock,
            sleeper: Arc::new(ImmediateSleeper),
        },
        ConnectionRequestConfig::default(),
    );

    let dispatcher = SessionDispatcher::spawn(
        owners,
        &DispatchConfig {
            timeout: Duration::from_millis(200),
            ..DispatchConfig::default()
        },
        &CancellationToken::new(),
    )
    .expect("workers");
    let router = StickySessionRouter::new(
        authenticators.clone(),
        Arc::new(dispatcher),
        Some(Credentials::new("zero-touch", "activate-cxnk")),
    );
    Fixture {
        state: HttpState::new(Arc::new(router), Arc::new(engine), authenticators),
        transport,
    }
}

fn fixture_owner() -> Vec<Box<dyn SessionOwner>> {
    vec![Box::new(FixtureSessionOwner::default())]
}

async fn call(state: &HttpState, request: actix_web::test::TestRequest) -> ServiceResponse {
    let app = actix_web::test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(json_config())
            .service(wake_device)
            .default_service(web::route().to(cwmp_entry)),
    )
    .await;
    actix_web::test::call_service(&app, request.to_request()).await
}

fn header_text<'a>(response: &'a ServiceResponse, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|value| value.to_str().ok())
}

#[rstest]
#[actix_web::test]
async fn trigger_runs_the_digest_handshake() {
    let transport = ScriptedDeviceTransport::new([
        Ok(DeviceResponse::challenge("Digest realm=\"cpe\", nonce=\"abc\", qop=\"auth\"")),
        Ok(DeviceResponse::status(200)),
    ]);
    let fixture = fixture(transport, fixture_owner()).await;

    let response = call(
        &fixture.state,
        actix_web::test::TestRequest::post().uri("/connection-requests").set_json(json!({
            "cpeId": "D1",
            "url": "http://10.0.0.9:7547/cr",
            "username": "admin",
            "password": "pw",
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let ticket: Value = actix_web::test::read_body_json(response).await;
    assert_eq!(ticket["deviceId"], "D1");
    assert_eq!(ticket["state"], "sent");
    assert_eq!(fixture.transport.request_count(), 2);
}

#[rstest]
#[actix_web::test]
async fn trigger_uses_org_default_credentials() {
    let transport = ScriptedDeviceTransport::new([
        Ok(DeviceResponse::challenge("Digest realm=\"cpe\", nonce=\"abc\", qop=\"auth\"")),
        Ok(DeviceResponse::status(204)),
    ]);
    let fixture = fixture(transport, fixture_owner()).await;

    call(
        &fixture.state,
        actix_web::test::TestRequest::post().uri("/connection-requests").set_json(json!({
            "cpeId": "D1",
            "url": "http://10.0.0.9:7547/cr",
            "orgId": "acme",
        })),
    )
    .await;

    let requests = fixture.transport.requests();
    let authorization = requests[1].authorization.as_deref().expect("digest answer");
    assert!(authorization.contains("username=\"cpe-user\""));
}

#[rstest]
#[case::not_json("{cpeId", "application/json")]
#[case::missing_url(r#"{"cpeId":"D1"}"#, "application/json")]
#[case::blank_device(r#"{"cpeId":" ","url":"http://10.0.0.9/cr"}"#, "application/json")]
#[actix_web::test]
async fn malformed_trigger_bodies_are_rejected(#[case] payload: &'static str, #[case] content_type: &str) {
    let fixture = fixture(ScriptedDeviceTransport::default(), fixture_owner()).await;

    let response = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/connection-requests")
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(payload),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = actix_web::test::read_body_json(response).await;
    assert_eq!(body["code"], "invalid_request");
    assert_eq!(fixture.transport.request_count(), 0);
}

#[rstest]
#[actix_web::test]
async fn unknown_acs_url_is_forbidden() {
    let fixture = fixture(ScriptedDeviceTransport::default(), fixture_owner()).await;

    let response = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/nowhere")
            .insert_header((header::HOST, "acs.acme.net")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(actix_web::test::read_body(response).await, "Invalid ACS URL");
}

#[rstest]
#[actix_web::test]
async fn missing_credentials_get_a_challenge() {
    let fixture = fixture(ScriptedDeviceTransport::default(), fixture_owner()).await;

    let response = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/cwmp")
            .insert_header((header::HOST, "acs.acme.net")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(header_text(&response, header::WWW_AUTHENTICATE).is_some());
}

#[rstest]
#[actix_web::test]
async fn session_cookie_binds_then_empty_post_ends_it() {
    let fixture = fixture(ScriptedDeviceTransport::default(), fixture_owner()).await;

    let first = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/cwmp")
            .insert_header((header::HOST, "acs.acme.net"))
            .insert_header((header::AUTHORIZATION, basic::authorization("acme", "acme-secret")))
            .set_payload("<Inform/>"),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let cookie = first
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "acs-session")
        .expect("session cookie")
        .value()
        .to_owned();

    let last = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/cwmp")
            .insert_header((header::COOKIE, format!("other=1; acs-session={cookie}"))),
    )
    .await;

    assert_eq!(last.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        header_text(&last, header::CONTENT_TYPE),
        Some("text/xml; charset=\"utf-8\"")
    );
    assert_eq!(last.headers().get("SOAPAction").map(|v| v.as_bytes()), Some(&b""[..]));
}

#[rstest]
#[actix_web::test]
async fn garbage_cookie_is_a_bad_request() {
    let fixture = fixture(ScriptedDeviceTransport::default(), fixture_owner()).await;

    let response = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/cwmp")
            .insert_header((header::COOKIE, "acs-session=%%%")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

struct SilentOwner;

#[async_trait::async_trait]
impl SessionOwner for SilentOwner {
    async fn handle(
        &mut self,
        _context: &crate::domain::session::SessionContext,
        _request: crate::domain::session::SessionRequest,
    ) -> crate::domain::session::SessionReply {
        std::future::pending().await
    }
}

#[rstest]
#[actix_web::test]
async fn silent_worker_yields_a_fault_with_200() {
    let fixture = fixture(ScriptedDeviceTransport::default(), vec![Box::new(SilentOwner)]).await;

    let response = call(
        &fixture.state,
        actix_web::test::TestRequest::post()
            .uri("/cwmp")
            .insert_header((header::HOST, "acs.acme.net"))
            .insert_header((header::AUTHORIZATION, basic::authorization("acme", "acme-secret")))
            .set_payload("<Inform/>"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = actix_web::test::read_body(response).await;
    let body = std::str::from_utf8(&body).expect("utf8");
    assert!(body.contains("<FaultCode>8002</FaultCode>"));
    assert!(body.contains("Internal Timeout!"));
}

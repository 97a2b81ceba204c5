//! End-to-end wake flows through the public engine API.

use std::sync::Arc;
use std::time::Duration;

use acs_backend::domain::ports::DeviceResponse;
use acs_backend::domain::{
    ConnectionRequestConfig, ConnectionRequestEngine, ConnectionRequestPorts,
    ConnectionRequestRuntime, ConnectionRequestTicket, TicketState, WakeRequest,
};
use acs_backend::test_support::{
    InMemoryTicketStore, MutableClock, RecordingCommunicationLog, RecordingSleeper,
    RecordingWakeObserver, ScriptedDeviceTransport,
};
use chrono::{TimeZone, Utc};
use mockable::Clock;
use rstest::{fixture, rstest};

struct World {
    clock: Arc<MutableClock>,
    store: Arc<InMemoryTicketStore>,
    log: Arc<RecordingCommunicationLog>,
    observer: Arc<RecordingWakeObserver>,
}

#[fixture]
fn world() -> World {
    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().expect("timestamp"),
    ));
    World {
        store: Arc::new(InMemoryTicketStore::new(clock.clone())),
        log: Arc::new(RecordingCommunicationLog::default()),
        observer: Arc::new(RecordingWakeObserver::default()),
        clock,
    }
}

fn engine(world: &World, transport: Arc<ScriptedDeviceTransport>) -> ConnectionRequestEngine {
    ConnectionRequestEngine::new(
        ConnectionRequestPorts {
            store: world.store.clone(),
            transport,
            communication_log: world.log.clone(),
            observers: vec![world.observer.clone()],
        },
        ConnectionRequestRuntime {
            clock: world.clock.clone(),
            sleeper: Arc::new(RecordingSleeper::default()),
        },
        ConnectionRequestConfig {
            owner: "acs-it-1".to_owned(),
            ..ConnectionRequestConfig::default()
        },
    )
}

fn d1() -> WakeRequest {
    WakeRequest::new("D1", "http://192.0.2.10:7547/cr", "cpe", "cpe-secret")
}

#[rstest]
#[tokio::test]
async fn digest_challenge_is_answered_and_ticket_is_sent(world: World) {
    let transport = Arc::new(ScriptedDeviceTransport::new([
        Ok(DeviceResponse::challenge(
            "Digest realm=\"IGD\", nonce=\"abc\", qop=\"auth\", algorithm=MD5",
        )),
        Ok(DeviceResponse::status(200)),
    ]));
    let engine = engine(&world, transport.clone());

    let ticket = engine.wake(&d1()).await;

    assert_eq!(ticket.state, TicketState::Sent);
    assert_eq!(ticket.error, None);
    assert!(engine.in_flight().is_empty());
    assert_eq!(world.store.ticket("D1"), Some(ticket.clone()));
    let second = &transport.requests()[1];
    let authorization = second.authorization.as_deref().expect("digest header");
    assert!(authorization.starts_with("Digest username=\"cpe\""));
    assert!(authorization.contains("nonce=\"abc\""));
    assert!(authorization.contains("nc=00000001"));
    assert_eq!(world.observer.tickets(), vec![ticket]);
    assert_eq!(world.log.entries()[0].summary, "Connection request sent");
}

#[rstest]
#[tokio::test]
async fn soaking_failure_is_returned_without_contacting_the_device(world: World) {
    let failed_at = world.clock.utc();
    let mut failed = ConnectionRequestTicket::sending("D1", "acs-it-2", failed_at);
    failed.mark_failed("unexpected status 500 from device", failed_at);
    world.store.seed(failed.clone(), Duration::from_secs(10));
    world.clock.advance_seconds(3);
    let transport = Arc::new(ScriptedDeviceTransport::default());
    let engine = engine(&world, transport.clone());

    let ticket = engine.wake(&d1()).await;

    assert_eq!(ticket, failed);
    assert_eq!(transport.request_count(), 0);
    assert!(world.log.entries().is_empty());
}

#[rstest]
#[tokio::test]
async fn concurrent_wakes_share_one_ticket(world: World) {
    let transport = Arc::new(
        ScriptedDeviceTransport::new([Ok(DeviceResponse::status(204))])
            .with_delay(Duration::from_millis(50)),
    );
    let engine = engine(&world, transport.clone());

    let request = d1();
    let (first, second) = tokio::join!(engine.wake(&request), engine.wake(&request));

    assert_eq!(transport.request_count(), 1);
    assert_eq!(world.store.create_count(), 1);
    let states = [first.state, second.state];
    assert!(states.contains(&TicketState::Sent));
    assert!(states.contains(&TicketState::Sending));
}

//! Port for the per-device CWMP session state machine owned by one worker.
use std::sync::Arc;

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};

use crate::domain::session::{SessionContext, SessionCookie, SessionReply, SessionRequest};

/// Handles the requests routed to one worker.
///
/// Each worker task owns its instance exclusively and feeds it one request at
/// a time, so implementations may keep per-device state without locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionOwner: Send {
    /// Process one routed request and produce the reply for the device.
    async fn handle(&mut self, context: &SessionContext, request: SessionRequest) -> SessionReply;
}

/// Minimal owner that binds a session on the first request and ends it on an
/// empty POST.
///
/// CWMP message handling is out of scope for the router; this owner stands in
/// for it so the HTTP surface can run end to end.
pub struct FixtureSessionOwner {
    clock: Arc<dyn Clock>,
    sessions_started: u64,
}

impl FixtureSessionOwner {
    /// Owner stamping issued cookies with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions_started: 0,
        }
    }
}

impl Default for FixtureSessionOwner {
    fn default() -> Self {
        Self::new(Arc::new(DefaultClock))
    }
}

#[async_trait]
impl SessionOwner for FixtureSessionOwner {
    async fn handle(&mut self, context: &SessionContext, request: SessionRequest) -> SessionReply {
        let empty_body = request.body.as_ref().is_none_or(Vec::is_empty);
        match request.cookie {
            None => {
                self.sessions_started += 1;
                let device_id = format!(
                    "{}-{}-{}",
                    request.org_id.as_deref().unwrap_or("unknown"),
                    context.worker_index,
                    self.sessions_started
                );
                let cookie = SessionCookie::issue(device_id, context, self.clock.utc());
                SessionReply::ok(None).with_cookie(cookie.encode())
            }
            Some(_) if empty_body => SessionReply::no_content(),
            Some(_) => SessionReply::ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rstest::rstest;

    use crate::test_support::MutableClock;

    #[rstest]
    #[tokio::test]
    async fn issued_cookie_carries_the_clock_time() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        let mut owner = FixtureSessionOwner::new(Arc::new(MutableClock::new(now)));
        let context = SessionContext {
            worker_index: 0,
            hostname: "acs-1".to_owned(),
        };

        let reply = owner
            .handle(
                &context,
                SessionRequest {
                    org_id: Some("org-1".to_owned()),
                    ..SessionRequest::default()
                },
            )
            .await;

        let raw = reply.cookie.expect("first request binds a session");
        let cookie = SessionCookie::decode(&raw, 1).expect("routable cookie");
        assert_eq!(cookie.issued_millis, now.timestamp_millis());
        assert_eq!(cookie.device_id, "org-1-0-1");
    }
}

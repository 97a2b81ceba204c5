//! Ticket and request types shared by the engine, its ports and adapters.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Credentials, Secret};

/// Lifecycle state of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    /// The handshake with the device is under way.
    Sending,
    /// The device accepted the request and should open a session.
    Sent,
    /// The device has opened the requested session.
    Session,
    /// The handshake failed; the ticket soaks until it expires.
    Failed,
    /// Another component holds the device.
    Locked,
}

impl TicketState {
    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Session => "session",
            Self::Failed => "failed",
            Self::Locked => "locked",
        }
    }
}

/// Shared-store record of an in-flight or recently finished wake attempt.
///
/// ## Invariants
/// - `error` is `Some` only when `state` is [`TicketState::Failed`].
/// - At most one live ticket per `device_id` exists in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequestTicket {
    /// Device the ticket concerns.
    #[schema(example = "00D09E-GW-1234")]
    pub device_id: String,
    /// Current state.
    pub state: TicketState,
    /// Worker identity that created the ticket.
    #[schema(example = "acs-1-4242")]
    pub owner: String,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time, or failure time once failed.
    pub timestamp: DateTime<Utc>,
}

impl ConnectionRequestTicket {
    /// Fresh ticket for a handshake about to start.
    pub fn sending(device_id: impl Into<String>, owner: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            state: TicketState::Sending,
            owner: owner.into(),
            error: None,
            timestamp: now,
        }
    }

    /// Move to the successful terminal state, clearing any error.
    pub fn mark_sent(&mut self) {
        self.state = TicketState::Sent;
        self.error = None;
    }

    /// Move to the failed terminal state.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = TicketState::Failed;
        self.error = Some(error.into());
        self.timestamp = now;
    }

    /// Time since the ticket was created or last failed.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.timestamp
    }

    /// True when the ticket records a failure.
    pub fn is_failed(&self) -> bool {
        self.state == TicketState::Failed
    }
}

/// Everything needed to wake one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    /// Device identifier used as the ticket key.
    pub device_id: String,
    /// Connection request URL the device advertised.
    pub callback_url: String,
    /// User name for the device's Digest challenge.
    pub username: String,
    /// Password for the device's Digest challenge.
    pub password: Secret,
    /// Internal proxy host fronting the device, if any.
    pub proxy: Option<String>,
}

impl WakeRequest {
    /// Build a request without a proxy.
    pub fn new(
        device_id: impl Into<String>,
        callback_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            callback_url: callback_url.into(),
            username: username.into(),
            password: password.into(),
            proxy: None,
        }
    }

    /// Route the request through `proxy`.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Fill blank credentials from an organization's device defaults.
    pub fn with_default_credentials(mut self, defaults: Option<&Credentials>) -> Self {
        let Some(defaults) = defaults else {
            return self;
        };
        if self.username.trim().is_empty() {
            self.username.clone_from(&defaults.username);
        }
        if self.password.is_empty() {
            self.password = defaults.password.clone();
        }
        self
    }

    /// Password presented to the device; an empty password falls back to the
    /// user name.
    pub(crate) fn effective_password(&self) -> &str {
        if self.password.is_empty() {
            &self.username
        } else {
            self.password.expose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid time")
    }

    #[rstest]
    fn ticket_serialises_camel_case_without_empty_error() {
        let ticket = ConnectionRequestTicket::sending("D1", "acs-1-7", now());
        let value = serde_json::to_value(&ticket).expect("serialise");
        assert_eq!(
            value,
            json!({
                "deviceId": "D1",
                "state": "sending",
                "owner": "acs-1-7",
                "timestamp": "2026-03-01T12:00:00Z",
            })
        );
    }

    #[rstest]
    fn failure_records_reason_and_time() {
        let mut ticket = ConnectionRequestTicket::sending("D1", "acs-1-7", now());
        let later = now() + TimeDelta::seconds(4);
        ticket.mark_failed("device unreachable", later);

        assert!(ticket.is_failed());
        assert_eq!(ticket.error.as_deref(), Some("device unreachable"));
        assert_eq!(ticket.age(later + TimeDelta::seconds(3)), TimeDelta::seconds(3));

        ticket.mark_sent();
        assert_eq!(ticket.error, None);
    }

    #[rstest]
    #[case::blank_both("", "", "cpe", "cpe-pass")]
    #[case::explicit_kept("me", "mine", "me", "mine")]
    fn default_credentials_fill_blanks(
        #[case] username: &str,
        #[case] password: &str,
        #[case] expected_user: &str,
        #[case] expected_password: &str,
    ) {
        let defaults = Credentials::new("cpe", "cpe-pass");
        let request = WakeRequest::new("D1", "http://d1/cr", username, password)
            .with_default_credentials(Some(&defaults));
        assert_eq!(request.username, expected_user);
        assert_eq!(request.password.expose(), expected_password);
    }

    #[rstest]
    fn empty_password_falls_back_to_username() {
        let request = WakeRequest::new("D1", "http://d1/cr", "admin", "");
        assert_eq!(request.effective_password(), "admin");
    }
}

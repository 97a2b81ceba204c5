//! Terminal failure reasons of a wake attempt.

use std::time::Duration;

use thiserror::Error;

use crate::domain::ports::{DeviceTransportError, TicketStoreError};

/// Why a connection request did not reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeFailure {
    /// The callback URL is unusable; nothing was sent.
    #[error("malformed connection request url: {0}")]
    MalformedUrl(String),
    /// The device's challenge could not be answered or the answer was refused.
    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),
    /// The device answered with a status other than success or challenge.
    #[error("unexpected status {0} from device")]
    UnexpectedStatus(u16),
    /// Connect, timeout or I/O failure.
    #[error("transport error: {0}")]
    TransportError(String),
    /// The shared ticket store could not be used.
    #[error("ticket store unavailable: {0}")]
    StoreUnavailable(String),
    /// A conflicting ticket kept vanishing between create and read.
    #[error("gave up after {0} ticket race retries")]
    RetriesExhausted(u32),
}

impl WakeFailure {
    pub(crate) fn timed_out(after: Duration) -> Self {
        Self::TransportError(format!("no answer within {after:?}"))
    }
}

impl From<DeviceTransportError> for WakeFailure {
    fn from(error: DeviceTransportError) -> Self {
        Self::TransportError(error.to_string())
    }
}

impl From<TicketStoreError> for WakeFailure {
    fn from(error: TicketStoreError) -> Self {
        Self::StoreUnavailable(error.to_string())
    }
}

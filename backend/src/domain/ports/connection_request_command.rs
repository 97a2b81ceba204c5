//! Driving port for triggering connection requests.
use async_trait::async_trait;

use crate::domain::{ConnectionRequestTicket, WakeRequest};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionRequestCommand: Send + Sync {
    /// Wake a device and return the resulting ticket.
    async fn wake(&self, request: WakeRequest) -> ConnectionRequestTicket;
}

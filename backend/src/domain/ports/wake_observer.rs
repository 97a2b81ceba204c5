//! Port notified when a connection request reaches a terminal outcome.
use async_trait::async_trait;

use super::define_port_error;
use crate::domain::ConnectionRequestTicket;

define_port_error! {
    /// Errors raised while delivering a completion notification.
    pub enum WakeObserverError {
        /// The notification could not be delivered.
        Delivery { message: String } => "wake notification failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WakeObserver: Send + Sync {
    /// Receive the terminal ticket of a finished connection request.
    async fn ticket_completed(
        &self,
        ticket: &ConnectionRequestTicket,
    ) -> Result<(), WakeObserverError>;
}

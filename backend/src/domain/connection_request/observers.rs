//! Completion observers that live in the domain.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::ConnectionRequestTicket;
use crate::domain::ports::{WakeObserver, WakeObserverError};

/// Emits one structured event per finished connection request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWakeObserver;

#[async_trait]
impl WakeObserver for TracingWakeObserver {
    async fn ticket_completed(
        &self,
        ticket: &ConnectionRequestTicket,
    ) -> Result<(), WakeObserverError> {
        match &ticket.error {
            None => info!(
                device_id = %ticket.device_id,
                state = ticket.state.as_str(),
                owner = %ticket.owner,
                "connection request completed"
            ),
            Some(error) => warn!(
                device_id = %ticket.device_id,
                state = ticket.state.as_str(),
                owner = %ticket.owner,
                error = %error,
                "connection request completed with failure"
            ),
        }
        Ok(())
    }
}

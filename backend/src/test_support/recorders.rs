//! Recording doubles for wake side effects.

use std::sync::Mutex;

use async_trait::async_trait;

use super::lock;
use crate::domain::ConnectionRequestTicket;
use crate::domain::ports::{
    CommunicationLog, CommunicationLogEntry, CommunicationLogError, WakeObserver,
    WakeObserverError,
};

#[derive(Default)]
pub struct RecordingCommunicationLog(Mutex<Vec<CommunicationLogEntry>>);

impl RecordingCommunicationLog {
    pub fn entries(&self) -> Vec<CommunicationLogEntry> {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl CommunicationLog for RecordingCommunicationLog {
    async fn record(&self, entry: &CommunicationLogEntry) -> Result<(), CommunicationLogError> {
        lock(&self.0).push(entry.clone());
        Ok(())
    }
}

/// Observer remembering each completed ticket; optionally fails delivery.
#[derive(Default)]
pub struct RecordingWakeObserver {
    tickets: Mutex<Vec<ConnectionRequestTicket>>,
    failing: bool,
}

impl RecordingWakeObserver {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn tickets(&self) -> Vec<ConnectionRequestTicket> {
        lock(&self.tickets).clone()
    }
}

#[async_trait]
impl WakeObserver for RecordingWakeObserver {
    async fn ticket_completed(
        &self,
        ticket: &ConnectionRequestTicket,
    ) -> Result<(), WakeObserverError> {
        lock(&self.tickets).push(ticket.clone());
        if self.failing {
            return Err(WakeObserverError::delivery("observer offline"));
        }
        Ok(())
    }
}

//! In-process ticket store with clock-driven expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;

use super::lock;
use crate::domain::ConnectionRequestTicket;
use crate::domain::ports::{TicketStore, TicketStoreError};

#[derive(Default)]
struct State {
    tickets: HashMap<String, (ConnectionRequestTicket, DateTime<Utc>)>,
    phantom_conflicts: u32,
    unavailable: bool,
    creates: usize,
}

/// Ticket store honouring TTLs against an injected clock.
pub struct InMemoryTicketStore {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl InMemoryTicketStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State::default()),
        }
    }

    /// Store a ticket directly, as another worker would.
    pub fn seed(&self, ticket: ConnectionRequestTicket, ttl: Duration) {
        let expires = self.expiry(ttl);
        lock(&self.state)
            .tickets
            .insert(ticket.device_id.clone(), (ticket, expires));
    }

    /// Live ticket for a device.
    pub fn ticket(&self, device_id: &str) -> Option<ConnectionRequestTicket> {
        let now = self.clock.utc();
        lock(&self.state)
            .tickets
            .get(device_id)
            .filter(|(_, expires)| *expires > now)
            .map(|(ticket, _)| ticket.clone())
    }

    /// Remaining TTL of a device's live ticket.
    pub fn remaining_ttl(&self, device_id: &str) -> Option<Duration> {
        let now = self.clock.utc();
        lock(&self.state)
            .tickets
            .get(device_id)
            .and_then(|(_, expires)| (*expires - now).to_std().ok())
            .filter(|remaining| !remaining.is_zero())
    }

    /// Make the next `count` create attempts collide with a ticket that has
    /// already expired by the time it is read.
    pub fn set_phantom_conflicts(&self, count: u32) {
        lock(&self.state).phantom_conflicts = count;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Number of successful create-if-absent calls.
    pub fn create_count(&self) -> usize {
        lock(&self.state).creates
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.utc() + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
    }

    fn check(&self) -> Result<(), TicketStoreError> {
        if lock(&self.state).unavailable {
            return Err(TicketStoreError::unavailable("store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn create_if_absent(
        &self,
        ticket: &ConnectionRequestTicket,
        ttl: Duration,
    ) -> Result<bool, TicketStoreError> {
        self.check()?;
        if self.ticket(&ticket.device_id).is_some() {
            return Ok(false);
        }
        let expires = self.expiry(ttl);
        let mut state = lock(&self.state);
        if state.phantom_conflicts > 0 {
            return Ok(false);
        }
        state.creates += 1;
        state
            .tickets
            .insert(ticket.device_id.clone(), (ticket.clone(), expires));
        Ok(true)
    }

    async fn get(&self, device_id: &str) -> Result<Option<ConnectionRequestTicket>, TicketStoreError> {
        self.check()?;
        {
            let mut state = lock(&self.state);
            if state.phantom_conflicts > 0 {
                state.phantom_conflicts -= 1;
                return Ok(None);
            }
        }
        Ok(self.ticket(device_id))
    }

    async fn replace_keep_ttl(&self, ticket: &ConnectionRequestTicket) -> Result<(), TicketStoreError> {
        self.check()?;
        let now = self.clock.utc();
        let mut state = lock(&self.state);
        if let Some(entry) = state
            .tickets
            .get_mut(&ticket.device_id)
            .filter(|(_, expires)| *expires > now)
        {
            entry.0 = ticket.clone();
        }
        Ok(())
    }

    async fn put(&self, ticket: &ConnectionRequestTicket, ttl: Duration) -> Result<(), TicketStoreError> {
        self.check()?;
        self.seed(ticket.clone(), ttl);
        Ok(())
    }

    async fn delete_if_owned(&self, device_id: &str, owner: &str) -> Result<bool, TicketStoreError> {
        self.check()?;
        let now = self.clock.utc();
        let mut state = lock(&self.state);
        let owned = state
            .tickets
            .get(device_id)
            .is_some_and(|(ticket, expires)| *expires > now && ticket.owner == owner);
        if owned {
            state.tickets.remove(device_id);
        }
        Ok(owned)
    }
}

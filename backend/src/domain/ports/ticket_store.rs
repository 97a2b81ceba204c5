//! Port for the shared, expiring connection-request ticket store.
//!
//! The store is multi-writer: every worker may create or overwrite any
//! device's ticket. Mutual exclusion rests entirely on
//! [`TicketStore::create_if_absent`] being atomic.
use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::ConnectionRequestTicket;

/// Key prefix for connection-request tickets.
pub const TICKET_KEY_PREFIX: &str = "connreq:";

/// Shared-store key for a device's ticket.
///
/// # Examples
/// ```
/// use acs_backend::domain::ports::ticket_key;
///
/// assert_eq!(ticket_key("00D09E-GW-1234"), "connreq:00D09E-GW-1234");
/// ```
pub fn ticket_key(device_id: &str) -> String {
    format!("{TICKET_KEY_PREFIX}{device_id}")
}

define_port_error! {
    /// Errors raised by ticket store adapters.
    pub enum TicketStoreError {
        /// The store could not be reached or rejected the command.
        Unavailable { message: String } => "ticket store unavailable: {message}",
        /// A stored ticket could not be encoded or decoded.
        Serialization { message: String } => "ticket serialisation failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Store `ticket` only when no live ticket exists for its device.
    ///
    /// Returns `false` when the key is already present.
    async fn create_if_absent(
        &self,
        ticket: &ConnectionRequestTicket,
        ttl: Duration,
    ) -> Result<bool, TicketStoreError>;

    /// Read the live ticket for a device. Absence is `Ok(None)`, never an error.
    async fn get(&self, device_id: &str) -> Result<Option<ConnectionRequestTicket>, TicketStoreError>;

    /// Overwrite an existing ticket without touching its remaining TTL.
    async fn replace_keep_ttl(&self, ticket: &ConnectionRequestTicket) -> Result<(), TicketStoreError>;

    /// Overwrite a ticket unconditionally with a fresh TTL.
    async fn put(&self, ticket: &ConnectionRequestTicket, ttl: Duration) -> Result<(), TicketStoreError>;

    /// Remove a device's ticket only while `owner` still holds it.
    ///
    /// Returns `false` when the ticket is gone or another worker has since
    /// claimed the device. The check and the removal are one atomic step.
    async fn delete_if_owned(&self, device_id: &str, owner: &str) -> Result<bool, TicketStoreError>;
}

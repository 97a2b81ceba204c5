//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod change_feed;
mod communication_log;
mod connection_request_command;
mod device_transport;
mod document_collection;
mod session_owner;
mod ticket_store;
mod wake_observer;

#[cfg(test)]
pub use change_feed::MockChangeFeed;
pub use change_feed::{ChangeFeed, ChangeFeedError, ChangeStream};
#[cfg(test)]
pub use communication_log::MockCommunicationLog;
pub use communication_log::{
    CONNECTION_REQUEST_KIND, CommunicationLog, CommunicationLogEntry, CommunicationLogError,
    FixtureCommunicationLog,
};
pub use connection_request_command::ConnectionRequestCommand;
#[cfg(test)]
pub use connection_request_command::MockConnectionRequestCommand;
#[cfg(test)]
pub use device_transport::MockDeviceTransport;
pub use device_transport::{DeviceRequest, DeviceResponse, DeviceTransport, DeviceTransportError};
#[cfg(test)]
pub use document_collection::MockDocumentCollection;
pub use document_collection::{DocumentCollection, DocumentCollectionError};
#[cfg(test)]
pub use session_owner::MockSessionOwner;
pub use session_owner::{FixtureSessionOwner, SessionOwner};
#[cfg(test)]
pub use ticket_store::MockTicketStore;
pub use ticket_store::{TICKET_KEY_PREFIX, TicketStore, TicketStoreError, ticket_key};
#[cfg(test)]
pub use wake_observer::MockWakeObserver;
pub use wake_observer::{WakeObserver, WakeObserverError};

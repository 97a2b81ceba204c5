//! Outbound HTTP to device connection request endpoints.

mod http_transport;

pub use http_transport::{DEFAULT_USER_AGENT, ReqwestDeviceTransport};

//! Port for the outbound HTTP exchange with a device's connection request URL.
use async_trait::async_trait;
use url::Url;

use super::define_port_error;

/// One outbound connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Device callback URL.
    pub url: Url,
    /// `Authorization` header value, set on the challenge response.
    pub authorization: Option<String>,
    /// Proxy URL (`http://host:port`) to route through instead of connecting directly.
    pub proxy: Option<String>,
}

/// The parts of a device reply the handshake needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    /// HTTP status code.
    pub status: u16,
    /// `WWW-Authenticate` header, when present.
    pub www_authenticate: Option<String>,
}

impl DeviceResponse {
    /// Response carrying only a status code.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            www_authenticate: None,
        }
    }

    /// 401 response carrying a challenge.
    pub fn challenge(header: impl Into<String>) -> Self {
        Self {
            status: 401,
            www_authenticate: Some(header.into()),
        }
    }
}

define_port_error! {
    /// Transport-level failures talking to a device.
    pub enum DeviceTransportError {
        /// The device did not answer within the request timeout.
        Timeout { message: String } => "device request timed out: {message}",
        /// The TCP/TLS connection could not be established.
        Connect { message: String } => "device connection failed: {message}",
        /// Any other I/O or protocol failure.
        Request { message: String } => "device request failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Issue one `GET` against the device and report status and challenge.
    async fn send(&self, request: &DeviceRequest) -> Result<DeviceResponse, DeviceTransportError>;
}

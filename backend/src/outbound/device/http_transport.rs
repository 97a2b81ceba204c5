//! Reqwest-backed device transport.
//!
//! This adapter owns transport details only: headers, proxy routing, timeout
//! and error mapping. Challenge handling stays in the engine.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy};

use crate::domain::ports::{DeviceRequest, DeviceResponse, DeviceTransport, DeviceTransportError};

/// `User-Agent` sent on connection requests.
pub const DEFAULT_USER_AGENT: &str = concat!("acs-backend/", env!("CARGO_PKG_VERSION"));

/// Device transport that connects directly or through a per-request proxy.
///
/// Reqwest binds proxies to clients, so one client is built lazily per proxy
/// URL and reused.
pub struct ReqwestDeviceTransport {
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
    timeout: Duration,
    user_agent: String,
}

impl ReqwestDeviceTransport {
    /// Build a transport whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_user_agent(timeout, DEFAULT_USER_AGENT)
    }

    /// Build a transport with an explicit `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_user_agent(
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            direct: client_builder(timeout).build()?,
            proxied: Mutex::new(HashMap::new()),
            timeout,
            user_agent: user_agent.into(),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, DeviceTransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        let mut clients = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }
        let client = Proxy::all(proxy)
            .and_then(|proxy| client_builder(self.timeout).proxy(proxy).build())
            .map_err(|error| DeviceTransportError::request(format!("invalid proxy {proxy}: {error}")))?;
        clients.insert(proxy.to_owned(), client.clone());
        Ok(client)
    }
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
}

#[async_trait]
impl DeviceTransport for ReqwestDeviceTransport {
    async fn send(&self, request: &DeviceRequest) -> Result<DeviceResponse, DeviceTransportError> {
        let client = self.client_for(request.proxy.as_deref())?;
        let mut builder = client
            .get(request.url.clone())
            .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
            .header(reqwest::header::ACCEPT, "*/*");
        if let Some(authorization) = &request.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization.as_str());
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let www_authenticate = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(DeviceResponse {
            status: response.status().as_u16(),
            www_authenticate,
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> DeviceTransportError {
    if error.is_timeout() {
        DeviceTransportError::timeout(error.to_string())
    } else if error.is_connect() {
        DeviceTransportError::connect(error.to_string())
    } else {
        DeviceTransportError::request(error.to_string())
    }
}

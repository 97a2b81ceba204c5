//! Connection requests: waking an idle device so it opens a CWMP session.
//!
//! A wake attempt is a short linear pipeline:
//!
//! 1. validate the callback URL (no I/O on failure);
//! 2. claim the device with an atomic create-if-absent ticket;
//! 3. run the unauthenticated request and, on a 401, the Digest retry;
//! 4. write the terminal ticket (keep TTL on success, soak on failure);
//! 5. release the local claim, notify observers and log the outcome.
//!
//! The shared store's create-if-absent is the only mutual-exclusion
//! primitive. The local in-flight set exists so shutdown can release claims.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mockable::Clock;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::http_auth::digest::DigestChallenge;
use crate::domain::ports::{
    CommunicationLog, CommunicationLogEntry, ConnectionRequestCommand, DeviceRequest,
    DeviceTransport, TicketStore, WakeObserver,
};
use crate::domain::{Sleeper, TokioSleeper};

mod config;
mod failure;
mod observers;
mod ticket;

pub use config::{
    ConnectionRequestConfig, ConnectionRequestConfigError, DEFAULT_PROXY_PORT, default_owner,
    host_name,
};
pub use failure::WakeFailure;
pub use observers::TracingWakeObserver;
pub use ticket::{ConnectionRequestTicket, TicketState, WakeRequest};

/// Method used for both legs of the device handshake.
const DEVICE_METHOD: &str = "GET";

/// Ports the engine talks to.
pub struct ConnectionRequestPorts {
    /// Shared expiring ticket store.
    pub store: Arc<dyn TicketStore>,
    /// Outbound HTTP to devices.
    pub transport: Arc<dyn DeviceTransport>,
    /// Device communication history.
    pub communication_log: Arc<dyn CommunicationLog>,
    /// Completion observers, notified in order.
    pub observers: Vec<Arc<dyn WakeObserver>>,
}

/// Time sources used by the engine.
pub struct ConnectionRequestRuntime {
    /// Wall clock for ticket timestamps.
    pub clock: Arc<dyn Clock>,
    /// Sleeper for the race retry delay.
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for ConnectionRequestRuntime {
    fn default() -> Self {
        Self {
            clock: Arc::new(mockable::DefaultClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Client-role state machine waking devices through their connection request URL.
pub struct ConnectionRequestEngine {
    store: Arc<dyn TicketStore>,
    transport: Arc<dyn DeviceTransport>,
    communication_log: Arc<dyn CommunicationLog>,
    observers: Vec<Arc<dyn WakeObserver>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    config: ConnectionRequestConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl ConnectionRequestEngine {
    /// Assemble an engine.
    pub fn new(
        ports: ConnectionRequestPorts,
        runtime: ConnectionRequestRuntime,
        config: ConnectionRequestConfig,
    ) -> Self {
        Self {
            store: ports.store,
            transport: ports.transport,
            communication_log: ports.communication_log,
            observers: ports.observers,
            clock: runtime.clock,
            sleeper: runtime.sleeper,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Active tuning.
    pub fn config(&self) -> &ConnectionRequestConfig {
        &self.config
    }

    /// Devices this engine is currently waking.
    pub fn in_flight(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.claims().iter().cloned().collect();
        devices.sort();
        devices
    }

    /// Wake a device and report the resulting ticket.
    ///
    /// Never fails: every outcome, including infrastructure trouble, is a
    /// ticket. A ticket returned for a conflicting attempt is the other
    /// attempt's ticket, unchanged.
    pub async fn wake(&self, request: &WakeRequest) -> ConnectionRequestTicket {
        let url = match parse_callback_url(&request.callback_url) {
            Ok(url) => url,
            Err(failure) => return self.rejected(&request.device_id, &failure),
        };

        let mut retries = 0_u32;
        loop {
            let ticket = ConnectionRequestTicket::sending(
                request.device_id.clone(),
                self.config.owner.clone(),
                self.clock.utc(),
            );
            match self
                .store
                .create_if_absent(&ticket, self.config.request_timeout)
                .await
            {
                Ok(true) => return self.perform(ticket, &url, request).await,
                Ok(false) => {}
                Err(error) => return self.rejected(&request.device_id, &error.into()),
            }

            match self.store.get(&request.device_id).await {
                Ok(Some(existing)) => {
                    debug!(
                        device_id = %request.device_id,
                        state = existing.state.as_str(),
                        owner = %existing.owner,
                        "device already claimed; returning existing ticket"
                    );
                    return existing;
                }
                Ok(None) => {}
                Err(error) => return self.rejected(&request.device_id, &error.into()),
            }

            if self
                .config
                .race_retry_limit
                .is_some_and(|limit| retries >= limit)
            {
                return self.rejected(&request.device_id, &WakeFailure::RetriesExhausted(retries));
            }
            retries += 1;
            info!(
                device_id = %request.device_id,
                attempt = retries,
                "ticket vanished before it could be read; retrying"
            );
            self.sleeper.sleep(self.config.race_retry_delay).await;
        }
    }

    /// Delete every ticket this engine still holds.
    ///
    /// Called on shutdown so other workers are not blocked for a full TTL.
    /// Tickets another worker has claimed meanwhile are left alone. Returns
    /// how many tickets were released.
    pub async fn release_in_flight(&self) -> usize {
        let devices: Vec<String> = self.claims().drain().collect();
        let mut released = 0;
        for device_id in devices {
            match self.store.delete_if_owned(&device_id, &self.config.owner).await {
                Ok(true) => released += 1,
                Ok(false) => debug!(device_id = %device_id, "ticket no longer ours; leaving it"),
                Err(error) => warn!(device_id = %device_id, error = %error, "failed to release ticket"),
            }
        }
        if released > 0 {
            info!(released, "released in-flight connection requests");
        }
        released
    }

    async fn perform(
        &self,
        mut ticket: ConnectionRequestTicket,
        url: &Url,
        request: &WakeRequest,
    ) -> ConnectionRequestTicket {
        self.claims().insert(ticket.device_id.clone());

        let outcome = tokio::time::timeout(self.config.request_timeout, self.handshake(url, request))
            .await
            .unwrap_or_else(|_elapsed| Err(WakeFailure::timed_out(self.config.request_timeout)));

        match outcome {
            Ok(()) => {
                ticket.mark_sent();
                if let Err(error) = self.store.replace_keep_ttl(&ticket).await {
                    warn!(device_id = %ticket.device_id, error = %error, "failed to record sent ticket");
                }
                info!(device_id = %ticket.device_id, "connection request sent");
            }
            Err(failure) => {
                ticket.mark_failed(failure.to_string(), self.clock.utc());
                if let Err(error) = self.store.put(&ticket, self.config.failure_soak).await {
                    warn!(device_id = %ticket.device_id, error = %error, "failed to record failed ticket");
                }
                warn!(device_id = %ticket.device_id, error = %failure, "connection request failed");
            }
        }

        self.claims().remove(&ticket.device_id);
        self.notify(&ticket).await;
        self.log(&ticket).await;
        ticket
    }

    async fn handshake(&self, url: &Url, request: &WakeRequest) -> Result<(), WakeFailure> {
        let proxy = request
            .proxy
            .as_ref()
            .map(|host| format!("http://{host}:{}", self.config.proxy_port));
        let mut device_request = DeviceRequest {
            url: url.clone(),
            authorization: None,
            proxy,
        };

        let first = self.transport.send(&device_request).await?;
        match first.status {
            200 | 204 => return Ok(()),
            401 => {}
            status => return Err(WakeFailure::UnexpectedStatus(status)),
        }

        let header = first.www_authenticate.ok_or_else(|| {
            WakeFailure::AuthenticationFailure("401 without a WWW-Authenticate challenge".to_owned())
        })?;
        let challenge = DigestChallenge::parse(&header)
            .map_err(|error| WakeFailure::AuthenticationFailure(error.to_string()))?;
        device_request.authorization = Some(challenge.authorize(
            &request.username,
            request.effective_password(),
            DEVICE_METHOD,
            &request_uri(url),
            &cnonce(),
            1,
        ));

        let second = self.transport.send(&device_request).await?;
        match second.status {
            200 | 204 => Ok(()),
            401 => Err(WakeFailure::AuthenticationFailure(
                "device rejected the Digest credentials".to_owned(),
            )),
            status => Err(WakeFailure::UnexpectedStatus(status)),
        }
    }

    fn rejected(&self, device_id: &str, failure: &WakeFailure) -> ConnectionRequestTicket {
        warn!(device_id, error = %failure, "connection request rejected");
        let now = self.clock.utc();
        let mut ticket =
            ConnectionRequestTicket::sending(device_id, self.config.owner.clone(), now);
        ticket.mark_failed(failure.to_string(), now);
        ticket
    }

    async fn notify(&self, ticket: &ConnectionRequestTicket) {
        for observer in &self.observers {
            if let Err(error) = observer.ticket_completed(ticket).await {
                warn!(device_id = %ticket.device_id, error = %error, "wake observer failed");
            }
        }
    }

    async fn log(&self, ticket: &ConnectionRequestTicket) {
        let summary = match &ticket.error {
            None => "Connection request sent".to_owned(),
            Some(error) => format!("Connection request failed: {error}"),
        };
        let entry =
            CommunicationLogEntry::connection_request(&ticket.device_id, summary, self.clock.utc());
        if let Err(error) = self.communication_log.record(&entry).await {
            warn!(device_id = %ticket.device_id, error = %error, "failed to append communication log");
        }
    }

    fn claims(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ConnectionRequestCommand for ConnectionRequestEngine {
    async fn wake(&self, request: WakeRequest) -> ConnectionRequestTicket {
        ConnectionRequestEngine::wake(self, &request).await
    }
}

fn parse_callback_url(raw: &str) -> Result<Url, WakeFailure> {
    let url = Url::parse(raw.trim()).map_err(|error| WakeFailure::MalformedUrl(format!("{raw}: {error}")))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(WakeFailure::MalformedUrl(format!(
            "{raw}: expected an http(s) URL with a host"
        ))),
    }
}

fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    }
}

fn cnonce() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

//! Webhook completion observer.
//!
//! POSTs every terminal connection request ticket as JSON to each configured
//! URL. Delivery is best effort: the first failing URL is reported, the
//! remaining URLs are still attempted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::domain::ConnectionRequestTicket;
use crate::domain::ports::{WakeObserver, WakeObserverError};

/// Wake observer delivering tickets to HTTP endpoints.
pub struct WebhookWakeObserver {
    client: Client,
    targets: Vec<Url>,
}

impl WebhookWakeObserver {
    /// Build an observer posting to `targets`, each attempt bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(targets: Vec<Url>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, targets })
    }

    /// Configured delivery targets.
    pub fn targets(&self) -> &[Url] {
        &self.targets
    }

    async fn deliver(&self, target: &Url, ticket: &ConnectionRequestTicket) -> Result<(), WakeObserverError> {
        let response = self
            .client
            .post(target.clone())
            .header(reqwest::header::USER_AGENT, crate::outbound::device::DEFAULT_USER_AGENT)
            .json(ticket)
            .send()
            .await
            .map_err(|error| WakeObserverError::delivery(format!("{target}: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WakeObserverError::delivery(format!(
                "{target}: unexpected status {}",
                status.as_u16()
            )));
        }
        debug!(device_id = %ticket.device_id, target = %target, "wake webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl WakeObserver for WebhookWakeObserver {
    async fn ticket_completed(
        &self,
        ticket: &ConnectionRequestTicket,
    ) -> Result<(), WakeObserverError> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(error) = self.deliver(target, ticket).await {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

//! Server configuration distilled from [`AcsSettings`].

use std::net::SocketAddr;

use acs_backend::domain::connection_request::host_name;
use acs_backend::settings::AcsSettings;
use color_eyre::eyre::{Result, WrapErr, eyre};

/// Everything the server needs before connecting to infrastructure.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) database_url: String,
    pub(crate) redis_url: String,
    pub(crate) hostname: String,
    pub(crate) settings: AcsSettings,
}

impl ServerConfig {
    /// Validate settings and resolve required connection URLs.
    ///
    /// # Errors
    /// Fails when a required URL is missing or a value cannot be parsed.
    pub fn from_settings(settings: AcsSettings) -> Result<Self> {
        let bind_addr = settings.bind_addr().wrap_err("invalid ACS_BIND_ADDR")?;
        let database_url = settings
            .database_url
            .clone()
            .ok_or_else(|| eyre!("ACS_DATABASE_URL is required"))?;
        let redis_url = settings
            .redis_url
            .clone()
            .ok_or_else(|| eyre!("ACS_REDIS_URL is required"))?;
        settings.reconcile().wrap_err("invalid reconciliation bounds")?;
        settings.webhook_urls().wrap_err("invalid ACS_WEBHOOK_URLS")?;
        settings
            .connection_requests()
            .validate()
            .wrap_err("invalid connection request tuning")?;
        Ok(Self {
            bind_addr,
            database_url,
            redis_url,
            hostname: host_name(),
            settings,
        })
    }

    /// Return the socket address the server will bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

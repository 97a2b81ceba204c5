//! Process settings loaded via OrthoConfig from CLI flags, `ACS_*`
//! environment variables and an optional configuration file.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::cache::ReconcileConfig;
use crate::domain::connection_request::{ConnectionRequestConfig, DEFAULT_PROXY_PORT, default_owner};
use crate::domain::http_auth::DEFAULT_REALM;
use crate::domain::session::DispatchConfig;
use crate::domain::Credentials;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE_POOL_SIZE: u32 = 10;
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONNREQ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNREQ_SOAK_SECS: u64 = 10;
const DEFAULT_CONNREQ_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_CONNREQ_RETRY_LIMIT: u32 = 3;
const DEFAULT_RECONCILE_MIN_SECS: u64 = 600;
const DEFAULT_RECONCILE_MAX_SECS: u64 = 1200;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ZERO_TOUCH_USERNAME: &str = "zero-touch";
const DEFAULT_ZERO_TOUCH_PASSWORD: &str = "activate-cxnk";

/// Settings for the ACS process.
///
/// Unset optional values fall back to the constants above through the
/// accessor methods.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "ACS")]
pub struct AcsSettings {
    /// Socket address the HTTP server listens on.
    pub bind_addr: Option<String>,
    /// Postgres URL for collections and the communication log.
    pub database_url: Option<String>,
    /// Maximum open Postgres connections.
    pub database_pool_size: Option<u32>,
    /// Redis URL for tickets and change events.
    pub redis_url: Option<String>,
    /// Session workers in the pool.
    pub workers: Option<usize>,
    /// Seconds a routed request may wait for its worker.
    pub dispatch_timeout_secs: Option<u64>,
    /// Seconds a connection request may take.
    pub connreq_timeout_secs: Option<u64>,
    /// Seconds a failed ticket blocks new attempts.
    pub connreq_soak_secs: Option<u64>,
    /// Seconds between ticket race retries.
    pub connreq_retry_delay_secs: Option<u64>,
    /// Ticket race retries before giving up; `0` retries forever.
    pub connreq_retry_limit: Option<u32>,
    /// Port of the internal connection request proxy.
    pub proxy_port: Option<u16>,
    /// Authentication realm advertised to devices.
    pub realm: Option<String>,
    /// Accept the zero-touch bootstrap credentials; on unless set to `false`.
    pub zero_touch_enabled: Option<bool>,
    pub zero_touch_username: Option<String>,
    pub zero_touch_password: Option<String>,
    /// Lower bound of the reconciliation interval, in seconds.
    pub reconcile_min_secs: Option<u64>,
    /// Upper bound of the reconciliation interval, in seconds.
    pub reconcile_max_secs: Option<u64>,
    /// URLs receiving terminal connection request tickets.
    ///
    /// The environment form is comma-separated; files may use a list.
    #[ortho_config(skip_cli)]
    pub webhook_urls: Option<UrlList>,
    /// Seconds each webhook delivery may take.
    pub webhook_timeout_secs: Option<u64>,
}

/// One URL or several, as the environment and file layers supply them.
///
/// A comma-separated environment value arrives as a sequence while a single
/// URL stays a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum UrlList {
    One(String),
    Many(Vec<String>),
}

impl UrlList {
    /// Trimmed, non-blank entries; a string entry may itself hold commas.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        let parts: &[String] = match self {
            Self::One(single) => std::slice::from_ref(single),
            Self::Many(many) => many,
        };
        parts
            .iter()
            .flat_map(|part| part.split(','))
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
    }
}

/// Settings values that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid bind address {value}: {message}")]
    BindAddr { value: String, message: String },
    #[error("invalid webhook url {value}: {message}")]
    WebhookUrl { value: String, message: String },
    #[error("reconciliation bounds are inverted: min {min}s > max {max}s")]
    ReconcileBounds { min: u64, max: u64 },
}

impl AcsSettings {
    /// Address to bind the HTTP server to.
    ///
    /// # Errors
    /// Returns [`SettingsError::BindAddr`] when the value is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse().map_err(|error: std::net::AddrParseError| SettingsError::BindAddr {
            value: raw.to_owned(),
            message: error.to_string(),
        })
    }

    /// Postgres pool cap.
    pub fn database_pool_size(&self) -> u32 {
        self.database_pool_size.unwrap_or(DEFAULT_DATABASE_POOL_SIZE)
    }

    /// Number of session workers, at least one.
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS).max(1)
    }

    /// Authentication realm.
    pub fn realm(&self) -> &str {
        self.realm.as_deref().unwrap_or(DEFAULT_REALM)
    }

    /// Bootstrap credentials, when zero-touch is enabled.
    pub fn zero_touch(&self) -> Option<Credentials> {
        self.zero_touch_enabled.unwrap_or(true).then(|| {
            Credentials::new(
                self.zero_touch_username
                    .as_deref()
                    .unwrap_or(DEFAULT_ZERO_TOUCH_USERNAME),
                self.zero_touch_password
                    .as_deref()
                    .unwrap_or(DEFAULT_ZERO_TOUCH_PASSWORD),
            )
        })
    }

    /// Worker pool tuning stamped with `hostname`.
    pub fn dispatch(&self, hostname: impl Into<String>) -> DispatchConfig {
        DispatchConfig {
            timeout: secs(self.dispatch_timeout_secs, DEFAULT_DISPATCH_TIMEOUT_SECS),
            hostname: hostname.into(),
            ..DispatchConfig::default()
        }
    }

    /// Connection request tuning.
    pub fn connection_requests(&self) -> ConnectionRequestConfig {
        let retry_limit = self.connreq_retry_limit.unwrap_or(DEFAULT_CONNREQ_RETRY_LIMIT);
        ConnectionRequestConfig {
            request_timeout: secs(self.connreq_timeout_secs, DEFAULT_CONNREQ_TIMEOUT_SECS),
            failure_soak: secs(self.connreq_soak_secs, DEFAULT_CONNREQ_SOAK_SECS),
            race_retry_delay: secs(self.connreq_retry_delay_secs, DEFAULT_CONNREQ_RETRY_DELAY_SECS),
            race_retry_limit: (retry_limit > 0).then_some(retry_limit),
            proxy_port: self.proxy_port.unwrap_or(DEFAULT_PROXY_PORT),
            owner: default_owner(),
        }
    }

    /// Reconciliation timing.
    ///
    /// # Errors
    /// Returns [`SettingsError::ReconcileBounds`] when min exceeds max.
    pub fn reconcile(&self) -> Result<ReconcileConfig, SettingsError> {
        let min = self.reconcile_min_secs.unwrap_or(DEFAULT_RECONCILE_MIN_SECS);
        let max = self.reconcile_max_secs.unwrap_or(DEFAULT_RECONCILE_MAX_SECS);
        if min > max {
            return Err(SettingsError::ReconcileBounds { min, max });
        }
        Ok(ReconcileConfig {
            min_interval: Duration::from_secs(min),
            max_interval: Duration::from_secs(max),
            ..ReconcileConfig::default()
        })
    }

    /// Parsed webhook targets; blank entries are ignored.
    ///
    /// # Errors
    /// Returns [`SettingsError::WebhookUrl`] for the first unparsable entry.
    pub fn webhook_urls(&self) -> Result<Vec<Url>, SettingsError> {
        let Some(list) = &self.webhook_urls else {
            return Ok(Vec::new());
        };
        list.entries()
            .map(|entry| {
                Url::parse(entry).map_err(|error| SettingsError::WebhookUrl {
                    value: entry.to_owned(),
                    message: error.to_string(),
                })
            })
            .collect()
    }

    /// Per-delivery webhook timeout.
    pub fn webhook_timeout(&self) -> Duration {
        secs(self.webhook_timeout_secs, DEFAULT_WEBHOOK_TIMEOUT_SECS)
    }
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

//! Port for the device communication history.
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use super::define_port_error;

/// Entry kind recorded for connection requests.
pub const CONNECTION_REQUEST_KIND: &str = "Connection Request";

/// One row of device communication history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationLogEntry {
    /// Device the exchange concerned.
    pub device_id: String,
    /// Exchange category, for example [`CONNECTION_REQUEST_KIND`].
    pub kind: String,
    /// Human-readable outcome.
    pub summary: String,
    /// When the exchange finished.
    pub created_at: DateTime<Utc>,
    /// When the entry may be purged.
    pub expires_at: DateTime<Utc>,
}

impl CommunicationLogEntry {
    /// Build a connection-request entry retained for one week.
    pub fn connection_request(
        device_id: impl Into<String>,
        summary: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            kind: CONNECTION_REQUEST_KIND.to_owned(),
            summary: summary.into(),
            created_at,
            expires_at: created_at + TimeDelta::weeks(1),
        }
    }
}

define_port_error! {
    /// Errors raised while appending communication history.
    pub enum CommunicationLogError {
        /// Storage connection could not be obtained.
        Connection { message: String } => "communication log connection failed: {message}",
        /// The write was rejected.
        Write { message: String } => "communication log write failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommunicationLog: Send + Sync {
    /// Append an entry.
    async fn record(&self, entry: &CommunicationLogEntry) -> Result<(), CommunicationLogError>;
}

/// Communication log that discards entries, used when no database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureCommunicationLog;

#[async_trait]
impl CommunicationLog for FixtureCommunicationLog {
    async fn record(&self, _entry: &CommunicationLogEntry) -> Result<(), CommunicationLogError> {
        Ok(())
    }
}

//! PostgreSQL-backed `CommunicationLog`.
//!
//! Entries carry their own `expires_at`; [`DieselCommunicationLog::purge_expired`]
//! removes rows past it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{CommunicationLog, CommunicationLogEntry, CommunicationLogError};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::NewCommunicationLogRow;
use super::pool::DbPool;
use super::schema::communication_log;

/// Appends device communication history.
#[derive(Clone)]
pub struct DieselCommunicationLog {
    pool: DbPool,
}

impl DieselCommunicationLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose retention has lapsed; returns how many went.
    ///
    /// # Errors
    /// Returns [`CommunicationLogError`] when the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CommunicationLogError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|error| map_basic_pool_error(error, CommunicationLogError::connection))?;
        let purged = diesel::delete(communication_log::table.filter(communication_log::expires_at.le(now)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        debug!(purged, "communication log purged");
        Ok(purged)
    }
}

fn map_diesel_error(error: diesel::result::Error) -> CommunicationLogError {
    map_basic_diesel_error(
        error,
        CommunicationLogError::write,
        CommunicationLogError::connection,
    )
}

#[async_trait]
impl CommunicationLog for DieselCommunicationLog {
    async fn record(&self, entry: &CommunicationLogEntry) -> Result<(), CommunicationLogError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|error| map_basic_pool_error(error, CommunicationLogError::connection))?;

        diesel::insert_into(communication_log::table)
            .values(&NewCommunicationLogRow {
                device_id: &entry.device_id,
                kind: &entry.kind,
                summary: &entry.summary,
                created_at: entry.created_at,
                expires_at: entry.expires_at,
            })
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }
}

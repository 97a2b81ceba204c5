//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{communication_log, documents};

/// Row read from the documents table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DocumentRow {
    pub id: String,
    pub body: serde_json::Value,
}

/// Insertable communication log row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = communication_log)]
pub(crate) struct NewCommunicationLogRow<'a> {
    pub device_id: &'a str,
    pub kind: &'a str,
    pub summary: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

//! PostgreSQL-backed `DocumentCollection` reading the `documents` table.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::Document;
use crate::domain::ports::{DocumentCollection, DocumentCollectionError};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::DocumentRow;
use super::pool::DbPool;
use super::schema::documents;

/// Reads whole collections for cache reconciliation.
#[derive(Clone)]
pub struct DieselDocumentCollection {
    pool: DbPool,
}

impl DieselDocumentCollection {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> DocumentCollectionError {
    map_basic_diesel_error(
        error,
        DocumentCollectionError::query,
        DocumentCollectionError::connection,
    )
}

#[async_trait]
impl DocumentCollection for DieselDocumentCollection {
    async fn load_all(&self, collection: &str) -> Result<Vec<Document>, DocumentCollectionError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|error| map_basic_pool_error(error, DocumentCollectionError::connection))?;

        let rows: Vec<DocumentRow> = documents::table
            .filter(documents::collection.eq(collection))
            .select(DocumentRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows
            .into_iter()
            .map(|row| Document::new(row.id, row.body))
            .collect())
    }
}

//! Port for reading whole collections from the backing document store.
use async_trait::async_trait;

use super::define_port_error;
use crate::domain::Document;

define_port_error! {
    /// Errors raised while querying a collection.
    pub enum DocumentCollectionError {
        /// Store connection could not be obtained.
        Connection { message: String } => "document store connection failed: {message}",
        /// The query failed or returned undecodable rows.
        Query { message: String } => "document store query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Read every document in `collection`.
    async fn load_all(&self, collection: &str) -> Result<Vec<Document>, DocumentCollectionError>;
}

//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Thin adapters over `diesel-async` with `bb8` pooling. Row structs
//! (`models.rs`) and table definitions (`schema.rs`) stay private to this
//! module; the domain sees only its own types.
//!
//! # Example
//!
//! ```ignore
//! use acs_backend::outbound::persistence::{DbPool, DieselDocumentCollection, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/acs")).await?;
//! let organizations = DieselDocumentCollection::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_communication_log;
mod diesel_document_collection;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_communication_log::DieselCommunicationLog;
pub use diesel_document_collection::DieselDocumentCollection;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};

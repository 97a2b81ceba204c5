//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed collections and communication log using Diesel
//! - **cache**: Redis-backed ticket store and change feed
//! - **device**: reqwest transport for device connection requests
//! - **webhook**: reqwest completion observer
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod cache;
pub mod device;
pub mod persistence;
pub mod webhook;

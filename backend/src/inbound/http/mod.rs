//! HTTP inbound adapter: the device-facing CWMP endpoint, the northbound
//! trigger and health probes.

pub mod connection_requests;
pub mod cwmp;
pub mod error;
pub mod fault;
pub mod health;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::json_config;

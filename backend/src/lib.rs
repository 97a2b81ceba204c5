//! ACS device-session coordination core.
//!
//! Wakes devices through their connection request URL, keeps organization
//! records mirrored in memory, and binds each device's CWMP session to one
//! worker.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use domain::TraceId;
pub use middleware::Trace;

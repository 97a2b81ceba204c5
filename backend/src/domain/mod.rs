//! Domain primitives and services of the ACS coordination core.
//!
//! Purpose: hold everything that decides behaviour, independent of HTTP,
//! Postgres or Redis. Adapters reach the domain only through [`ports`].
//!
//! Public surface:
//! - [`cache`]: the generic reconciling cache and its projections.
//! - [`AuthenticatorCache`]: organizations indexed by ACS URL.
//! - [`http_auth`]: Basic and Digest verification per organization.
//! - [`connection_request`]: the device wake-up engine.
//! - [`session`]: sticky routing of device exchanges to workers.
//! - Error (alias to `error::Error`): API error response payload.

mod authenticator_cache;
pub mod cache;
pub mod connection_request;
mod document;
pub mod error;
pub mod http_auth;
mod organization;
pub mod ports;
mod secret;
pub mod session;
mod sleeper;
mod trace_id;

pub use self::authenticator_cache::{
    AuthenticatorCache, OrganizationProjection, normalize_acs_url, normalize_path,
};
pub use self::connection_request::{
    ConnectionRequestConfig, ConnectionRequestEngine, ConnectionRequestPorts,
    ConnectionRequestRuntime, ConnectionRequestTicket, TicketState, TracingWakeObserver,
    WakeFailure, WakeRequest,
};
pub use self::document::{
    CRUD_TYPE_FIELD, ChangeEvent, ChangeEventError, CrudType, Document, DocumentError, ID_FIELD,
    ORG_ID_FIELD, str_field,
};
pub use self::error::{Error, ErrorCode, TRACE_ID_HEADER};
pub use self::organization::{Credentials, ORGANIZATIONS_COLLECTION, Organization};
pub use self::secret::Secret;
#[cfg(test)]
pub use self::sleeper::MockSleeper;
pub use self::sleeper::{Sleeper, TokioSleeper};
pub use self::trace_id::TraceId;

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use acs_backend::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;

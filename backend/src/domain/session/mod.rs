//! Sticky CWMP sessions: per-org authentication, cookie affinity and the
//! worker pool that owns device sessions.
//!
//! A request without a cookie is authenticated against its organization and
//! assigned a worker round-robin. A request with a cookie goes straight to
//! the worker the cookie names.

mod cookie;
mod dispatch;
mod router;

pub use cookie::{CookieError, SESSION_COOKIE_NAME, SessionCookie};
pub use dispatch::{DispatchConfig, DispatchError, SessionDispatcher};
pub use router::{InboundRequest, Rejection, RouteOutcome, StickySessionRouter};

/// Worker identity handed to a [`crate::domain::ports::SessionOwner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Position in the worker pool.
    pub worker_index: usize,
    /// Host running the pool.
    pub hostname: String,
}

/// Payload delivered to a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRequest {
    /// Raw `Authorization` header, when present.
    pub auth_header: Option<String>,
    /// Opaque CWMP body.
    pub body: Option<Vec<u8>>,
    /// Organization that authenticated the request; absent on cookie routes.
    pub org_id: Option<String>,
    /// Affinity cookie the device presented.
    pub cookie: Option<SessionCookie>,
    /// `Host` header as received.
    pub host_header: Option<String>,
    /// True when the device authenticated with bootstrap credentials.
    pub zero_touch: bool,
}

/// Worker answer translated onto the HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReply {
    /// HTTP status.
    pub status_code: u16,
    /// XML body.
    pub body: Option<String>,
    /// New affinity cookie value.
    pub cookie: Option<String>,
    /// `WWW-Authenticate` value.
    pub auth_challenge: Option<String>,
}

impl SessionReply {
    /// 200 with an optional body.
    pub fn ok(body: Option<String>) -> Self {
        Self {
            status_code: 200,
            body,
            cookie: None,
            auth_challenge: None,
        }
    }

    /// 204, ending the exchange.
    pub fn no_content() -> Self {
        Self {
            status_code: 204,
            ..Self::ok(None)
        }
    }

    /// Attach a `Set-Cookie` value.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Attach a `WWW-Authenticate` value.
    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.auth_challenge = Some(challenge.into());
        self
    }
}

#[cfg(test)]
mod tests;

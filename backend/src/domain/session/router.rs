//! Per-request routing state machine.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{CookieError, DispatchError, SessionCookie, SessionDispatcher, SessionReply, SessionRequest};
use crate::domain::http_auth::AuthVerdict;
use crate::domain::{AuthenticatorCache, Credentials};

/// The parts of a device HTTP request the router looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    /// `http` or `https`, as terminated by this server.
    pub scheme: String,
    /// `Host` header.
    pub host: Option<String>,
    /// Request path.
    pub path: String,
    /// `Authorization` header.
    pub authorization: Option<String>,
    /// Raw affinity cookie value.
    pub cookie: Option<String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl InboundRequest {
    /// URL the device believes it is talking to.
    pub fn external_url(&self) -> String {
        match &self.host {
            Some(host) => format!("{}://{host}{}", self.scheme, self.path),
            None => self.path.clone(),
        }
    }
}

/// Requests refused before reaching a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The affinity cookie cannot be decoded.
    BadCookie(CookieError),
    /// No organization serves the requested URL.
    UnknownUrl,
    /// Credentials are missing or wrong; carries a fresh challenge.
    Unauthorized {
        /// `WWW-Authenticate` value.
        challenge: String,
    },
}

impl Rejection {
    /// HTTP status for the rejection.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadCookie(_) => 400,
            Self::UnknownUrl => 403,
            Self::Unauthorized { .. } => 401,
        }
    }

    /// Reason text sent in the body.
    pub fn reason(&self) -> String {
        match self {
            Self::BadCookie(error) => error.to_string(),
            Self::UnknownUrl => "Invalid ACS URL".to_owned(),
            Self::Unauthorized { .. } => "Unauthorized".to_owned(),
        }
    }
}

/// Terminal state of one routed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The worker replied.
    Delivered(SessionReply),
    /// Refused before dispatch.
    Rejected(Rejection),
    /// Accepted but the worker never answered.
    Fault(DispatchError),
}

/// HTTP entry point binding device exchanges to workers.
pub struct StickySessionRouter {
    authenticators: AuthenticatorCache,
    dispatcher: Arc<SessionDispatcher>,
    zero_touch: Option<Credentials>,
}

impl StickySessionRouter {
    /// Build a router. `zero_touch` is the bootstrap credential pair, when
    /// enabled.
    pub fn new(
        authenticators: AuthenticatorCache,
        dispatcher: Arc<SessionDispatcher>,
        zero_touch: Option<Credentials>,
    ) -> Self {
        Self {
            authenticators,
            dispatcher,
            zero_touch,
        }
    }

    /// Worker pool behind the router.
    pub fn dispatcher(&self) -> &Arc<SessionDispatcher> {
        &self.dispatcher
    }

    /// Authenticate or decode affinity, then deliver to one worker.
    pub async fn route(&self, inbound: InboundRequest) -> RouteOutcome {
        let (worker_index, request) = match self.admit(inbound) {
            Ok(admitted) => admitted,
            Err(rejection) => {
                debug!(status = rejection.status(), reason = %rejection.reason(), "request rejected");
                return RouteOutcome::Rejected(rejection);
            }
        };

        match self.dispatcher.dispatch(worker_index, request).await {
            Ok(reply) => RouteOutcome::Delivered(reply),
            Err(error) => {
                warn!(worker = worker_index, error = %error, "session dispatch failed");
                RouteOutcome::Fault(error)
            }
        }
    }

    fn admit(&self, inbound: InboundRequest) -> Result<(usize, SessionRequest), Rejection> {
        if let Some(raw) = inbound.cookie.as_deref() {
            let cookie = SessionCookie::decode(raw, self.dispatcher.pool_size())
                .map_err(Rejection::BadCookie)?;
            let worker_index = cookie.worker_index;
            return Ok((
                worker_index,
                SessionRequest {
                    auth_header: inbound.authorization,
                    body: inbound.body,
                    org_id: None,
                    cookie: Some(cookie),
                    host_header: inbound.host,
                    zero_touch: false,
                },
            ));
        }

        let authenticator = self
            .authenticators
            .lookup(&inbound.external_url(), &inbound.path)
            .ok_or(Rejection::UnknownUrl)?;
        let zero_touch = match authenticator
            .verify(inbound.authorization.as_deref(), self.zero_touch.as_ref())
        {
            AuthVerdict::Accepted => false,
            AuthVerdict::ZeroTouch => true,
            AuthVerdict::Rejected => {
                return Err(Rejection::Unauthorized {
                    challenge: authenticator.challenge(),
                });
            }
        };

        let worker_index = self.dispatcher.next_worker();
        debug!(
            org_id = authenticator.org_id(),
            worker = worker_index,
            zero_touch,
            "new exchange accepted"
        );
        Ok((
            worker_index,
            SessionRequest {
                auth_header: inbound.authorization,
                body: inbound.body,
                org_id: Some(authenticator.org_id().to_owned()),
                cookie: None,
                host_header: inbound.host,
                zero_touch,
            },
        ))
    }
}

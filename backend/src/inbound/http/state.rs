//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain types and ports and remain testable without I/O.

use std::sync::Arc;

use crate::domain::AuthenticatorCache;
use crate::domain::ports::ConnectionRequestCommand;
use crate::domain::session::StickySessionRouter;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Device-facing session router.
    pub router: Arc<StickySessionRouter>,
    /// Connection request trigger.
    pub connection_requests: Arc<dyn ConnectionRequestCommand>,
    /// Organization lookups for default device credentials.
    pub authenticators: AuthenticatorCache,
}

impl HttpState {
    /// Bundle handler dependencies.
    pub fn new(
        router: Arc<StickySessionRouter>,
        connection_requests: Arc<dyn ConnectionRequestCommand>,
        authenticators: AuthenticatorCache,
    ) -> Self {
        Self {
            router,
            connection_requests,
            authenticators,
        }
    }
}

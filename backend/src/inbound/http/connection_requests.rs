//! Northbound connection request trigger.
//!
//! ```text
//! POST /connection-requests {"cpeId":"D1","url":"http://10.0.0.9:7547/cr"}
//! ```

use actix_web::{post, web};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::state::HttpState;
use crate::domain::{ApiResult, ConnectionRequestTicket, Error, WakeRequest};

/// Body of `POST /connection-requests`.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequestBody {
    /// Device identifier.
    #[schema(example = "CXNK0012AB34")]
    pub cpe_id: String,
    /// Connection request URL reported by the device.
    #[schema(example = "http://10.0.0.9:7547/cr")]
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Internal proxy host fronting the device.
    pub proxy: Option<String>,
    /// Organization whose default device credentials fill blanks.
    pub org_id: Option<String>,
}

impl ConnectionRequestBody {
    fn into_wake_request(self, state: &HttpState) -> ApiResult<WakeRequest> {
        if self.cpe_id.trim().is_empty() {
            return Err(Error::invalid_request("cpeId must not be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(Error::invalid_request("url must not be empty"));
        }
        let defaults = self
            .org_id
            .as_deref()
            .and_then(|org_id| state.authenticators.by_org_id(org_id));
        let mut request = WakeRequest::new(
            self.cpe_id,
            self.url,
            self.username.unwrap_or_default(),
            self.password.unwrap_or_default(),
        )
        .with_default_credentials(
            defaults
                .as_ref()
                .and_then(|authenticator| authenticator.organization().device_credentials.as_ref()),
        );
        if let Some(proxy) = self.proxy.filter(|proxy| !proxy.trim().is_empty()) {
            request = request.with_proxy(proxy);
        }
        Ok(request)
    }
}

/// Wake a device and return the resulting ticket.
///
/// Device and infrastructure failures are reported inside the ticket, so the
/// only error status is 400 for an unusable body.
#[utoipa::path(
    post,
    path = "/connection-requests",
    request_body = ConnectionRequestBody,
    responses(
        (status = 200, description = "Terminal or in-progress ticket", body = ConnectionRequestTicket),
        (status = 400, description = "Malformed body", body = Error)
    ),
    tags = ["connection-requests"],
    operation_id = "wakeDevice"
)]
#[post("/connection-requests")]
pub async fn wake_device(
    state: web::Data<HttpState>,
    payload: web::Json<ConnectionRequestBody>,
) -> ApiResult<web::Json<ConnectionRequestTicket>> {
    let request = payload.into_inner().into_wake_request(&state)?;
    info!(device_id = %request.device_id, proxied = request.proxy.is_some(), "connection request triggered");
    let ticket = state.connection_requests.wake(request).await;
    Ok(web::Json(ticket))
}

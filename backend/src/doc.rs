//! OpenAPI documentation for the northbound surface.
//!
//! Device-facing CWMP traffic is not described here: its paths are whatever
//! URLs organizations provision, and its bodies are SOAP.

use utoipa::OpenApi;

use crate::domain::{ConnectionRequestTicket, Error, ErrorCode, TicketState};
use crate::inbound::http::connection_requests::ConnectionRequestBody;

/// OpenAPI document for the northbound API.
/// Swagger UI is served in debug builds only.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ACS coordination API",
        description = "Connection request trigger and health probes."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::connection_requests::wake_device,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        ConnectionRequestBody,
        ConnectionRequestTicket,
        TicketState,
        Error,
        ErrorCode
    )),
    tags(
        (name = "connection-requests", description = "Waking devices"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

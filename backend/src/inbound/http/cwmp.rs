//! Device-facing CWMP endpoint.
//!
//! Mounted as the default service: the org path is whatever URL the device
//! was provisioned with, so every unmatched request lands here.

use actix_web::cookie::Cookie;
use actix_web::http::{StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, web};
use tracing::debug;

use super::fault::CwmpFault;
use super::state::HttpState;
use crate::domain::session::{
    InboundRequest, Rejection, RouteOutcome, SESSION_COOKIE_NAME, SessionReply,
};

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Route one device request through the sticky session router.
pub async fn cwmp_entry(
    request: HttpRequest,
    body: web::Bytes,
    state: web::Data<HttpState>,
) -> HttpResponse {
    let inbound = inbound_request(&request, &body);
    debug!(path = %inbound.path, has_cookie = inbound.cookie.is_some(), "device request");
    match state.router.route(inbound).await {
        RouteOutcome::Delivered(reply) => delivered(reply),
        RouteOutcome::Rejected(rejection) => rejected(&rejection),
        RouteOutcome::Fault(error) => HttpResponse::Ok()
            .content_type(XML_CONTENT_TYPE)
            .body(CwmpFault::for_dispatch(&error).to_xml()),
    }
}

fn inbound_request(request: &HttpRequest, body: &web::Bytes) -> InboundRequest {
    let header_text = |name: header::HeaderName| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    let cookie = request
        .cookie(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned());
    InboundRequest {
        scheme: request.connection_info().scheme().to_owned(),
        host: header_text(header::HOST),
        path: request.path().to_owned(),
        authorization: header_text(header::AUTHORIZATION),
        cookie,
        body: (!body.is_empty()).then(|| body.to_vec()),
    }
}

fn delivered(reply: SessionReply) -> HttpResponse {
    let status = StatusCode::from_u16(reply.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    if let Some(value) = reply.cookie {
        builder.cookie(
            Cookie::build(SESSION_COOKIE_NAME, value)
                .path("/")
                .http_only(true)
                .finish(),
        );
    }
    if let Some(challenge) = reply.auth_challenge {
        builder.insert_header((header::WWW_AUTHENTICATE, challenge));
    }
    if status == StatusCode::NO_CONTENT {
        builder
            .insert_header((header::CONTENT_TYPE, XML_CONTENT_TYPE))
            .insert_header(("SOAPAction", ""));
        return builder.finish();
    }
    match reply.body {
        Some(body) => builder.content_type(XML_CONTENT_TYPE).body(body),
        None => builder.finish(),
    }
}

fn rejected(rejection: &Rejection) -> HttpResponse {
    let status = StatusCode::from_u16(rejection.status()).unwrap_or(StatusCode::BAD_REQUEST);
    let mut builder = HttpResponse::build(status);
    if let Rejection::Unauthorized { challenge } = rejection {
        builder.insert_header((header::WWW_AUTHENTICATE, challenge.as_str()));
    }
    builder.body(rejection.reason())
}

//! HTTP adapter mapping for domain errors.
//!
//! Purpose: keep the domain error type HTTP-agnostic while allowing Actix
//! handlers to turn domain failures into consistent JSON responses and status
//! codes.

use actix_web::{HttpRequest, HttpResponse, ResponseError, error::JsonPayloadError, http::StatusCode, web};
use tracing::error;

use crate::domain::{Error, ErrorCode, TRACE_ID_HEADER};

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn redact_if_internal(error: &Error) -> Error {
    if matches!(error.code(), ErrorCode::InternalError) {
        let mut redacted = Error::internal("Internal server error");
        if let Some(id) = error.trace_id() {
            redacted = redacted.with_trace_id(id.to_owned());
        }
        redacted
    } else {
        error.clone()
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(id) = self.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }

        builder.json(redact_if_internal(self))
    }
}

impl From<actix_web::Error> for Error {
    fn from(err: actix_web::Error) -> Self {
        // Do not leak implementation details to clients.
        error!(error = %err, "actix error promoted to domain error");
        Error::internal("Internal server error")
    }
}

/// JSON extractor configuration turning body errors into `invalid_request`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(json_error)
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::invalid_request(format!("malformed request body: {err}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, body::to_bytes, post};
    use rstest::rstest;
    use serde_json::Value;

    #[rstest]
    #[case::invalid(Error::invalid_request("bad"), StatusCode::BAD_REQUEST)]
    #[case::unauthorized(Error::unauthorized("who"), StatusCode::UNAUTHORIZED)]
    #[case::forbidden(Error::forbidden("no"), StatusCode::FORBIDDEN)]
    #[case::missing(Error::not_found("gone"), StatusCode::NOT_FOUND)]
    #[case::unavailable(Error::service_unavailable("redis down"), StatusCode::SERVICE_UNAVAILABLE)]
    #[case::internal(Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_codes_to_statuses(#[case] error: Error, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[rstest]
    #[actix_web::test]
    async fn internal_messages_are_redacted() {
        let response = Error::internal("pool exhausted at 10.0.0.7").with_trace_id("t-1").error_response();

        assert_eq!(
            response.headers().get(TRACE_ID_HEADER).and_then(|v| v.to_str().ok()),
            Some("t-1")
        );
        let body = to_bytes(response.into_body()).await.expect("body");
        let value: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["message"], "Internal server error");
        assert_eq!(value["traceId"], "t-1");
    }

    #[post("/echo")]
    async fn echo(body: web::Json<Value>) -> web::Json<Value> {
        body
    }

    #[rstest]
    #[actix_web::test]
    async fn malformed_json_is_an_invalid_request() {
        let app =
            actix_web::test::init_service(App::new().app_data(json_config()).service(echo)).await;
        let request = actix_web::test::TestRequest::post()
            .uri("/echo")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();

        let response = actix_web::test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = actix_web::test::read_body_json(response).await;
        assert_eq!(body["code"], "invalid_request");
    }
}

//! Request correlation middleware.
//!
//! Every request runs inside a `request` span and a [`TraceId`] scope. The id
//! is echoed in the `trace-id` response header, so device and northbound
//! logs can be joined with error bodies. A valid `trace-id` request header is
//! adopted instead of minting a new id.

use std::rc::Rc;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{Instrument, debug, info_span, warn};

use crate::domain::{TRACE_ID_HEADER, TraceId};

/// Middleware factory; wrap it outermost so rejections carry the header too.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use acs_backend::Trace;
///
/// let app = App::new().wrap(Trace);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl<S, B> Transform<S, ServiceRequest> for Trace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TraceMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TraceMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// Service produced by [`Trace`].
pub struct TraceMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for TraceMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let supplied = req
            .headers()
            .get(TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        let trace_id = TraceId::adopt_or_generate(supplied);
        let span = info_span!(
            "request",
            trace_id = %trace_id,
            method = %req.method(),
            path = %req.path(),
        );
        let service = Rc::clone(&self.service);
        let handled = async move {
            let mut res = service.call(req).await?;
            debug!(status = res.status().as_u16(), "request finished");
            stamp(&mut res, trace_id);
            Ok(res)
        };
        Box::pin(TraceId::scope(trace_id, handled).instrument(span))
    }
}

fn stamp<B>(res: &mut ServiceResponse<B>, trace_id: TraceId) {
    match HeaderValue::from_str(&trace_id.to_string()) {
        Ok(value) => {
            res.headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
        Err(error) => warn!(%error, "trace id is not a valid header value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, web};
    use rstest::rstest;

    use crate::domain::{ApiResult, Error as ApiError};

    async fn echo_current() -> HttpResponse {
        match TraceId::current() {
            Some(id) => HttpResponse::Ok().body(id.to_string()),
            None => HttpResponse::InternalServerError().finish(),
        }
    }

    async fn unavailable() -> ApiResult<HttpResponse> {
        Err(ApiError::service_unavailable("redis down"))
    }

    fn header(res: &ServiceResponse) -> String {
        res.headers()
            .get(TRACE_ID_HEADER)
            .expect("trace id header")
            .to_str()
            .expect("ascii header")
            .to_owned()
    }

    #[rstest]
    #[case::minted(None)]
    #[case::garbage_replaced(Some("not-a-uuid"))]
    #[actix_web::test]
    async fn handlers_see_the_echoed_id(#[case] supplied: Option<&str>) {
        let app = actix_web::test::init_service(
            App::new().wrap(Trace).route("/", web::get().to(echo_current)),
        )
        .await;
        let mut request = actix_web::test::TestRequest::get().uri("/");
        if let Some(value) = supplied {
            request = request.insert_header((TRACE_ID_HEADER, value));
        }

        let res = actix_web::test::call_service(&app, request.to_request()).await;

        let echoed = header(&res);
        assert_ne!(Some(echoed.as_str()), supplied);
        let body = actix_web::test::read_body(res).await;
        assert_eq!(std::str::from_utf8(&body).expect("utf8 body"), echoed);
    }

    #[rstest]
    #[actix_web::test]
    async fn caller_supplied_id_is_adopted() {
        let supplied = "0e7b7d4c-5d0f-4f43-9a51-7c1b2a6f9e10";
        let app = actix_web::test::init_service(
            App::new().wrap(Trace).route("/", web::get().to(echo_current)),
        )
        .await;

        let res = actix_web::test::call_service(
            &app,
            actix_web::test::TestRequest::get()
                .uri("/")
                .insert_header((TRACE_ID_HEADER, supplied))
                .to_request(),
        )
        .await;

        assert_eq!(header(&res), supplied);
    }

    #[rstest]
    #[actix_web::test]
    async fn error_bodies_carry_the_trace_id() {
        let app = actix_web::test::init_service(
            App::new().wrap(Trace).route("/", web::get().to(unavailable)),
        )
        .await;

        let res = actix_web::test::call_service(
            &app,
            actix_web::test::TestRequest::get().uri("/").to_request(),
        )
        .await;

        let echoed = header(&res);
        let body: serde_json::Value = actix_web::test::read_body_json(res).await;
        assert_eq!(body["traceId"], echoed);
    }
}

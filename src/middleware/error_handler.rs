//! Global error translation. The backstop for anything a handler lets through.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use serde_json::json;
use tracing::error;

use super::{Middleware, Next};
use crate::error::HandlerResult;
use crate::request::RequestContext;
use crate::response::{Response, timestamp};

/// Message sent when the inner chain panicked.
const PANIC_MESSAGE: &str = "Internal server error";

/// `{ "success": false, "error": message, "timestamp": <RFC 3339 UTC> }`.
pub fn failure_response(status: StatusCode, message: &str) -> Response {
    Response::builder().status(status).json(&json!({
        "success": false,
        "error": message,
        "timestamp": timestamp(),
    }))
}

/// Turns every `Err` and every panic from the inner chain into a
/// [`failure_response`] carrying the error's status. Always returns `Ok`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

#[async_trait]
impl Middleware for ErrorHandler {
    async fn handle(&self, ctx: RequestContext, next: Next) -> HandlerResult {
        let method = ctx.method();
        let path = ctx.path().to_owned();
        let request_id = ctx.request_id();

        match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(Ok(res)) => Ok(res),
            Ok(Err(e)) => {
                error!(?request_id, %method, %path, status = e.status().as_u16(), "request failed: {e}");
                Ok(failure_response(e.status(), &e.to_string()))
            }
            Err(_) => {
                error!(?request_id, %method, %path, "handler panicked");
                Ok(failure_response(StatusCode::INTERNAL_SERVER_ERROR, PANIC_MESSAGE))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::method::Method;
    use crate::middleware::Pipeline;

    async fn run(handler: impl crate::Handler) -> Response {
        Pipeline::new()
            .layer(ErrorHandler)
            .handler(handler)
            .call(RequestContext::new(Method::Get, "/"))
            .await
            .expect("error handler never returns Err")
    }

    fn assert_failure_shape(res: &Response, status: StatusCode, message: &str) {
        assert_eq!(res.status_code(), status);
        let body = res.json_body();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], message);
        let timestamp = body["timestamp"].as_str().expect("timestamp is a string");
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn successful_responses_pass_through() {
        let res = run(|_ctx: RequestContext| async {
            Ok::<_, HandlerError>(Response::json(&json!({ "ok": true })))
        })
        .await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.json_body(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn every_error_variant_becomes_the_failure_shape() {
        let cases = [
            (HandlerError::Validation("bad input".into()), StatusCode::BAD_REQUEST, "bad input"),
            (HandlerError::MethodNotAllowed, StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            (HandlerError::NotFound("Token tidak sah".into()), StatusCode::BAD_REQUEST, "Token tidak sah"),
            (
                HandlerError::Internal("Failed to get system health".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get system health",
            ),
        ];

        for (err, status, message) in cases {
            let res = run(move |_ctx: RequestContext| {
                let err = err.clone();
                async move { Err::<Response, _>(err) }
            })
            .await;
            assert_failure_shape(&res, status, message);
        }
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let res = run(|_ctx: RequestContext| async {
            if true {
                panic!("handler bug");
            }
            Ok::<_, HandlerError>(Response::status(StatusCode::OK))
        })
        .await;

        assert_failure_shape(&res, StatusCode::INTERNAL_SERVER_ERROR, PANIC_MESSAGE);
    }
}

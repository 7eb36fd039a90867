//! Per-route method validation.

use std::collections::BTreeSet;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use super::{Middleware, Next, failure_response};
use crate::error::{HandlerError, HandlerResult};
use crate::method::Method;
use crate::request::RequestContext;

/// Static per-route declaration, checked once per incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    allowed_methods: BTreeSet<Method>,
}

impl RouteConfig {
    pub fn new(allowed_methods: impl IntoIterator<Item = Method>) -> Self {
        Self { allowed_methods: allowed_methods.into_iter().collect() }
    }

    pub fn allows(&self, method: Method) -> bool {
        self.allowed_methods.contains(&method)
    }

    /// Value for the `allow` header, e.g. `"GET, POST"`.
    pub fn allow_header(&self) -> String {
        self.allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rejects requests whose method is not in the route's [`RouteConfig`].
///
/// The rejection is a `405` with an `allow` header and the standard failure
/// body. The rest of the chain is never entered and this layer never returns
/// `Err`.
pub struct Validation {
    config: RouteConfig,
}

impl Validation {
    pub fn new(config: RouteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Middleware for Validation {
    async fn handle(&self, ctx: RequestContext, next: Next) -> HandlerResult {
        if !self.config.allows(ctx.method()) {
            debug!(method = %ctx.method(), path = ctx.path(), "method rejected by route config");
            let mut res = failure_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &HandlerError::MethodNotAllowed.to_string(),
            );
            if let Ok(allow) = self.config.allow_header().parse() {
                res.headers_mut().insert(http::header::ALLOW, allow);
            }
            return Ok(res);
        }
        next.run(ctx).await
    }
}

//! Per-request context threaded through the middleware chain.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::method::Method;

/// An incoming request plus the metadata layers attach on the way in.
///
/// Method, path, headers and body are read-only once built. The only
/// mutations available to middleware are [`attach_request_id`] and
/// [`mark_started`], and both keep the first value written.
///
/// [`attach_request_id`]: RequestContext::attach_request_id
/// [`mark_started`]: RequestContext::mark_started
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    request_id: Option<Uuid>,
    started_at: Option<Instant>,
}

impl RequestContext {
    /// Builds a context with no headers and an empty body.
    ///
    /// The server uses [`from_parts`](Self::from_parts); this constructor is
    /// for driving a [`Router`](crate::Router) directly, as tests do.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            request_id: None,
            started_at: None,
        }
    }

    pub(crate) fn from_parts(method: Method, path: String, headers: HeaderMap, body: Bytes) -> Self {
        Self { headers, body, ..Self::new(method, path) }
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialises `value` as the body and sets `content-type: application/json`.
    pub fn with_json<T: serde::Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("content-type", "application/json").with_body(body)
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses the body as JSON.
    ///
    /// An empty or malformed body is a [`HandlerError::Validation`].
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        if self.body.is_empty() {
            return Err(HandlerError::Validation("request body is empty".to_owned()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| HandlerError::Validation(format!("invalid JSON body: {e}")))
    }

    pub fn request_id(&self) -> Option<Uuid> { self.request_id }
    pub fn started_at(&self) -> Option<Instant> { self.started_at }

    /// Attaches `id` unless an outer layer already did. Returns the id in effect.
    pub fn attach_request_id(&mut self, id: Uuid) -> Uuid {
        *self.request_id.get_or_insert(id)
    }

    /// Records `at` as the request start unless already recorded. Returns the
    /// instant in effect.
    pub fn mark_started(&mut self, at: Instant) -> Instant {
        *self.started_at.get_or_insert(at)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Body {
        token: String,
    }

    #[test]
    fn header_lookup_ignores_case() {
        let ctx = RequestContext::new(Method::Get, "/")
            .with_header("X-Request-Id", "abc");
        assert_eq!(ctx.header("x-request-id"), Some("abc"));
        assert_eq!(ctx.header("missing"), None);
    }

    #[test]
    fn parses_json_body() {
        let ctx = RequestContext::new(Method::Post, "/")
            .with_body(r#"{"token":"abc"}"#);
        assert_eq!(ctx.json::<Body>(), Ok(Body { token: "abc".into() }));
    }

    #[test]
    fn empty_or_malformed_body_is_a_validation_error() {
        let empty = RequestContext::new(Method::Post, "/");
        assert!(matches!(empty.json::<Body>(), Err(HandlerError::Validation(_))));

        let broken = RequestContext::new(Method::Post, "/").with_body("{not json");
        assert!(matches!(broken.json::<Body>(), Err(HandlerError::Validation(_))));
    }

    #[test]
    fn derived_metadata_keeps_the_first_value() {
        let mut ctx = RequestContext::new(Method::Get, "/");
        let first = Uuid::new_v4();
        assert_eq!(ctx.attach_request_id(first), first);
        assert_eq!(ctx.attach_request_id(Uuid::new_v4()), first);

        let t0 = Instant::now();
        assert_eq!(ctx.mark_started(t0), t0);
        assert_eq!(ctx.mark_started(Instant::now()), t0);
    }
}

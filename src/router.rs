//! Radix-tree request router.
//!
//! One tree keyed by path, O(path-length) lookup. Each path holds handlers per
//! method plus an optional catch-all. A catch-all route sees every method,
//! which is what lets a [`Validation`](crate::middleware::Validation) layer
//! answer wrong methods itself.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use http::StatusCode;
use http::header::ALLOW;
use matchit::Router as MatchitRouter;
use tracing::warn;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::request::RequestContext;
use crate::response::Response;

#[derive(Default)]
struct Route {
    by_method: BTreeMap<Method, BoxedHandler>,
    any: Option<BoxedHandler>,
}

impl Route {
    fn allow_header(&self) -> String {
        self.by_method.keys().map(|m| m.as_str()).collect::<Vec<_>>().join(", ")
    }
}

enum Lookup {
    Found(BoxedHandler, HashMap<String, String>),
    MethodNotAllowed(String),
    NotFound,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Registrations return `self` so they chain.
///
/// # Panics
///
/// Registration panics on a malformed or conflicting path. Routes are static,
/// so this surfaces at startup.
#[derive(Default)]
pub struct Router {
    tree: MatchitRouter<usize>,
    paths: HashMap<String, usize>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `ctx.param("name")` retrieves them.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = self.route_mut(path);
        route.by_method.insert(method, handler.into_boxed_handler());
        self
    }

    /// Register a handler that receives every method on `path`.
    ///
    /// Method-specific handlers registered with [`on`](Self::on) take
    /// precedence.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        let route = self.route_mut(path);
        route.any = Some(handler.into_boxed_handler());
        self
    }

    fn route_mut(&mut self, path: &str) -> &mut Route {
        let index = match self.paths.get(path) {
            Some(&index) => index,
            None => {
                let index = self.routes.len();
                self.tree
                    .insert(path, index)
                    .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
                self.paths.insert(path.to_owned(), index);
                self.routes.push(Route::default());
                index
            }
        };
        &mut self.routes[index]
    }

    fn lookup(&self, method: Method, path: &str) -> Lookup {
        let Ok(matched) = self.tree.at(path) else {
            return Lookup::NotFound;
        };
        let route = &self.routes[*matched.value];
        let handler = route.by_method.get(&method).or(route.any.as_ref());
        match handler {
            Some(handler) => {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                Lookup::Found(Arc::clone(handler), params)
            }
            None => Lookup::MethodNotAllowed(route.allow_header()),
        }
    }

    /// Routes one request and produces one response. Never fails.
    ///
    /// An `Err` escaping a route without an
    /// [`ErrorHandler`](crate::middleware::ErrorHandler) is answered with
    /// `{ "error": message }` and the error's status.
    pub async fn handle(&self, mut ctx: RequestContext) -> Response {
        match self.lookup(ctx.method(), ctx.path()) {
            Lookup::Found(handler, params) => {
                ctx.set_params(params);
                let method = ctx.method();
                let path = ctx.path().to_owned();
                match handler.call(ctx).await {
                    Ok(res) => res,
                    Err(e) => {
                        warn!(%method, %path, status = e.status().as_u16(), "unhandled route error: {e}");
                        Response::error(e.status(), e.to_string())
                    }
                }
            }
            Lookup::MethodNotAllowed(allow) => {
                let mut res = Response::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
                if let Ok(allow) = allow.parse() {
                    res.headers_mut().insert(ALLOW, allow);
                }
                res
            }
            Lookup::NotFound => Response::error(StatusCode::NOT_FOUND, "Not found"),
        }
    }
}

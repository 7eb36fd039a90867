//! # gatehouse
//!
//! A small HTTP backend: email verification, a monitored health check and a
//! key-value read, served by hyper and routed by a radix tree.
//!
//! ## The pipeline
//!
//! Cross-cutting concerns are middleware objects composed once at startup by
//! a [`Pipeline`](middleware::Pipeline). The health route runs the full stack:
//!
//! ```text
//! Validation → Monitoring → Logging → ErrorHandler → handler
//! ```
//!
//! - **Validation** rejects methods the route does not allow, before anything
//!   else runs.
//! - **Monitoring** records one timing sample per request into an injected
//!   metrics sink.
//! - **Logging** writes one structured entry per request; a broken sink never
//!   fails the request.
//! - **ErrorHandler** turns every error or panic into
//!   `{success: false, error, timestamp}`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatehouse::middleware::{InMemoryMetrics, Pipeline, RouteConfig, TracingLogSink};
//! use gatehouse::{HandlerError, Method, RequestContext, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let chain = Pipeline::standard(
//!         RouteConfig::new([Method::Get]),
//!         Arc::new(InMemoryMetrics::default()),
//!         Arc::new(TracingLogSink),
//!     )
//!     .handler(status);
//!
//!     let app = Router::new()
//!         .any("/status", chain)
//!         .on(Method::Post, "/echo", echo);
//!
//!     Server::bind("0.0.0.0:3000".parse().unwrap()).serve(app).await.unwrap();
//! }
//!
//! async fn status(_ctx: RequestContext) -> Result<Response, HandlerError> {
//!     Ok(Response::json(&"ok"))
//! }
//!
//! async fn echo(ctx: RequestContext) -> Result<Response, HandlerError> {
//!     let body: serde_json::Value = ctx.json()?;
//!     Ok(Response::json(&body))
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod app;
pub mod auth;
pub mod config;
pub mod health;
pub mod kv;
pub mod middleware;

pub use error::{Error, HandlerError, HandlerResult};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, UnknownMethod};
pub use request::RequestContext;
pub use response::{IntoResponse, Json, Response, ResponseBuilder, timestamp};
pub use router::Router;
pub use server::{DEFAULT_BODY_LIMIT, Server};

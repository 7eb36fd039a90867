//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: method validation, metrics, structured logging and
//! error translation.
//!
//! # The model
//!
//! A layer is an object implementing [`Middleware::handle`]. It receives the
//! request context and a [`Next`] cursor over the rest of the chain. Calling
//! `next.run(ctx).await` delegates inward; returning without calling it
//! short-circuits. Anything after the `.await` is post-processing and runs on
//! the way back out, innermost layer first.
//!
//! ```text
//!   request ─▶ Validation ─▶ Monitoring ─▶ Logging ─▶ ErrorHandler ─▶ handler
//!  response ◀─ Validation ◀─ Monitoring ◀─ Logging ◀─ ErrorHandler ◀─┘
//! ```
//!
//! A [`Pipeline`] collects layers outermost-first and is sealed with
//! [`Pipeline::handler`]. The result is a [`Chain`], which is itself a
//! [`Handler`] and is registered on a [`Router`](crate::Router) like any
//! other handler. Layers are built once at startup; per request only the
//! context and a `Next` cursor are allocated.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatehouse::middleware::{
//!     InMemoryMetrics, Pipeline, RouteConfig, TracingLogSink,
//! };
//! use gatehouse::{HandlerError, Method, RequestContext, Response, Router};
//!
//! async fn ping(_ctx: RequestContext) -> Result<Response, HandlerError> {
//!     Ok(Response::json(&"pong"))
//! }
//!
//! let metrics = Arc::new(InMemoryMetrics::default());
//! let chain = Pipeline::standard(
//!     RouteConfig::new([Method::Get]),
//!     metrics,
//!     Arc::new(TracingLogSink),
//! )
//! .handler(ping);
//!
//! let app = Router::new().any("/ping", chain);
//! ```

mod error_handler;
mod logging;
mod monitoring;
mod validation;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerResult;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::request::RequestContext;

pub use error_handler::{ErrorHandler, failure_response};
pub use logging::{LogEntry, LogSink, Logging, MemoryLogSink, SinkError, TracingLogSink};
pub use monitoring::{
    FanOut, InMemoryMetrics, MetricsSink, MetricsSummary, Monitoring, Outcome, RecorderMetrics,
    RequestSample,
};
pub use validation::{RouteConfig, Validation};

/// One cross-cutting concern wrapped around a handler.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: RequestContext, next: Next) -> HandlerResult;
}

type Layers = Arc<[Arc<dyn Middleware>]>;

// ── Next ─────────────────────────────────────────────────────────────────────

/// The remainder of the chain, as seen from inside one layer.
pub struct Next {
    layers: Layers,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    /// Runs the next layer, or the endpoint once every layer has been entered.
    pub fn run(self, ctx: RequestContext) -> BoxFuture {
        let Self { layers, index, endpoint } = self;
        let layer = layers.get(index).cloned();
        match layer {
            Some(layer) => {
                let next = Next { layers, index: index + 1, endpoint };
                Box::pin(async move { layer.handle(ctx, next).await })
            }
            None => endpoint.call(ctx),
        }
    }
}

// ── Chain ────────────────────────────────────────────────────────────────────

/// A handler with its middleware layers applied.
///
/// Built by [`Pipeline::handler`]. Has the same external signature as the
/// handler it wraps.
pub struct Chain {
    layers: Layers,
    endpoint: BoxedHandler,
}

impl Chain {
    /// Runs the whole chain for one request.
    pub fn call(&self, ctx: RequestContext) -> BoxFuture {
        Next {
            layers: Arc::clone(&self.layers),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        }
        .run(ctx)
    }
}

impl ErasedHandler for Chain {
    fn call(&self, ctx: RequestContext) -> BoxFuture {
        Chain::call(self, ctx)
    }
}

impl private::Sealed for Chain {}

impl Handler for Chain {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Ordered middleware builder. The first layer added is the outermost.
#[derive(Default)]
pub struct Pipeline {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four-layer stack used by monitored routes:
    /// Validation → Monitoring → Logging → ErrorHandler.
    pub fn standard(
        config: RouteConfig,
        metrics: Arc<dyn MetricsSink>,
        logs: Arc<dyn LogSink>,
    ) -> Self {
        Self::new()
            .layer(Validation::new(config))
            .layer(Monitoring::new(metrics))
            .layer(Logging::new(logs))
            .layer(ErrorHandler)
    }

    /// Appends `layer` inside every layer added so far.
    pub fn layer(mut self, layer: impl Middleware) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Seals the pipeline around `handler`.
    pub fn handler(self, handler: impl Handler) -> Chain {
        Chain {
            layers: self.layers.into(),
            endpoint: handler.into_boxed_handler(),
        }
    }
}

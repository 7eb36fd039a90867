//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router and the middleware chain both hold handlers of *different*
//! concrete types. Rust collections hold one type only, so every handler is
//! hidden behind `dyn ErasedHandler` and stored uniformly:
//!
//! ```text
//! async fn verify(ctx: RequestContext) -> Result<Response, HandlerError>  ← user writes this
//!        ↓ router.on(Method::Post, "/api/auth/verify", verify)
//! verify.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(verify))                        ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ctx)  at request time                 ← one vtable dispatch
//! ```
//!
//! A composed [`Chain`](crate::middleware::Chain) is itself a `Handler`, so a
//! route never knows whether it points at a bare function or a whole pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{HandlerError, HandlerResult};
use crate::request::RequestContext;
use crate::response::IntoResponse;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to a [`HandlerResult`].
///
/// `Send + 'static` let tokio move the future across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: RequestContext) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route target.
///
/// Satisfied automatically by any function or closure with the shape
///
/// ```text
/// Fn(RequestContext) -> impl Future<Output = Result<impl IntoResponse, HandlerError>>
/// ```
///
/// and by [`Chain`](crate::middleware::Chain). The trait is sealed: nothing
/// outside this crate can add implementations.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

pub(crate) mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}

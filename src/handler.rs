//! Middleware and endpoint handler traits, and their type erasure.
//!
//! # Two kinds of handlers
//!
//! - A **middleware** sits in a [`Chain`](crate::Chain). It receives a
//!   [`Next`] that owns the request, the response and the context, and hands
//!   control back by consuming it (`proceed` / `fail`), possibly from another
//!   task.
//! - An **endpoint** ([`Handler`]) is the `async fn(HttpRequest) -> impl
//!   IntoResponse` a [`Mount`](crate::Mount) falls through to once every
//!   middleware has passed.
//!
//! Both are stored behind an `Arc<dyn …>` so handlers of different concrete
//! types fit into one collection and can be shared by concurrent requests:
//!
//! ```text
//! |next| next.proceed()                 ← user writes this
//!        ↓ chain.register("/api", f)
//! Arc::new(f) as Arc<dyn Middleware>    ← blanket impl below
//!        ↓ at dispatch time
//! middleware.handle(next)               ← one vtable call
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::next::Next;
use crate::request::{HttpRequest, MountRequest};
use crate::response::{Completion, IntoResponse, Response};

// ── Middleware ────────────────────────────────────────────────────────────────

/// A function run by a [`Chain`](crate::Chain) for every request whose path
/// matches its prefix.
///
/// Closures `Fn(Next<…>)` implement this automatically. Implement it yourself
/// for middleware that carries configuration:
///
/// ```rust,ignore
/// struct RequireHeader(&'static str);
///
/// impl Middleware<HttpRequest, HttpResponse, (), BoxError> for RequireHeader {
///     fn handle(&self, next: Next<HttpRequest, HttpResponse, (), BoxError>) {
///         if next.request().header(self.0).is_some() {
///             next.proceed();
///         } else {
///             next.fail(format!("missing header `{}`", self.0));
///         }
///     }
/// }
/// ```
pub trait Middleware<Req, Res, Ctx, E>: Send + Sync
where
    Req: MountRequest,
    Res: Completion,
{
    fn handle(&self, next: Next<Req, Res, Ctx, E>);
}

impl<F, Req, Res, Ctx, E> Middleware<Req, Res, Ctx, E> for F
where
    F: Fn(Next<Req, Res, Ctx, E>) + Send + Sync,
    Req: MountRequest,
    Res: Completion,
{
    fn handle(&self, next: Next<Req, Res, Ctx, E>) {
        (self)(next)
    }
}

/// A type-erased middleware shared by every run of a chain.
pub(crate) type BoxedMiddleware<Req, Res, Ctx, E> = Arc<dyn Middleware<Req, Res, Ctx, E>>;

// ── Endpoint handler ──────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface for endpoints.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: HttpRequest) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid endpoint.
///
/// Satisfied automatically by any `async fn` with the signature:
///
/// ```text
/// async fn name(req: HttpRequest) -> impl IntoResponse
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete endpoint function to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: HttpRequest) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

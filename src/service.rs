//! hyper integration: a middleware chain in front of one endpoint.
//!
//! For every request [`Mount`] reads the body, runs the chain, then settles in
//! one of four ways:
//!
//! | Chain result                          | Response sent                     |
//! |---------------------------------------|-----------------------------------|
//! | a middleware called `res.end(..)`     | that response                     |
//! | finished, no error                    | the endpoint's response           |
//! | finished with an error                | `500`, error logged               |
//! | continuation dropped, response open   | `500`, logged as abandoned        |
//!
//! Headers middleware set on the [`HttpResponse`] before passing are merged
//! in front of the endpoint's own headers.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Body;
use hyper::service::Service;
use tokio::sync::oneshot;
use tracing::error;

use crate::chain::{Chain, Outcome};
use crate::error::{BoxError, Error};
use crate::handler::{BoxedHandler, Handler, Middleware};
use crate::next::Next;
use crate::request::HttpRequest;
use crate::response::{HttpResponse, Response, Settled, prepend_headers};

/// The continuation type middleware mounted on a [`Mount`] receive.
pub type HttpNext = Next<HttpRequest, HttpResponse, (), BoxError>;

/// A hyper [`Service`] that runs a middleware chain before an endpoint.
///
/// Build it once at startup. Cloning is cheap; every connection can hold its
/// own clone.
///
/// ```rust,no_run
/// use waymark::{HttpNext, HttpRequest, Mount};
///
/// async fn hello(_req: HttpRequest) -> &'static str {
///     "hello"
/// }
///
/// let app = Mount::new(hello)
///     .any(|mut next: HttpNext| {
///         next.response_mut().set_header("x-frame-options", "DENY");
///         next.proceed();
///     })
///     .at("/admin", |next: HttpNext| {
///         if next.request().header("authorization").is_some() {
///             next.proceed();
///         } else {
///             next.fail("missing credentials");
///         }
///     });
/// ```
#[derive(Clone)]
pub struct Mount {
    chain: Chain<HttpRequest, HttpResponse>,
    endpoint: BoxedHandler,
}

impl Mount {
    /// Creates a mount with no middleware; every request reaches `endpoint`.
    pub fn new(endpoint: impl Handler) -> Self {
        Self { chain: Chain::new(settle), endpoint: endpoint.into_boxed_handler() }
    }

    /// Adds a middleware for paths under `prefix`.
    pub fn at<F>(mut self, prefix: &str, middleware: F) -> Self
    where
        F: Fn(HttpNext) + Send + Sync + 'static,
    {
        self.chain.register(prefix, middleware);
        self
    }

    /// Adds a middleware for every path.
    pub fn any<F>(mut self, middleware: F) -> Self
    where
        F: Fn(HttpNext) + Send + Sync + 'static,
    {
        self.chain.register_any(middleware);
        self
    }

    /// Adds a [`Middleware`] implementation for paths under `prefix`.
    pub fn with(mut self, prefix: &str, middleware: impl Middleware<HttpRequest, HttpResponse, (), BoxError> + 'static) -> Self {
        self.chain.register_middleware(prefix, middleware);
        self
    }

    pub fn chain(&self) -> &Chain<HttpRequest, HttpResponse> {
        &self.chain
    }

    /// Serves one request. Never fails: every error becomes a `500`.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        match self.dispatch(req).await {
            Ok(response) => response.into_inner(),
            Err(e) => {
                error!(error = %e, "request failed");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR).into_inner()
            }
        }
    }

    async fn dispatch<B>(&self, req: http::Request<B>) -> Result<Response, Error>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let request = HttpRequest::from_http(req).await?;

        let (tx, rx) = oneshot::channel();
        self.chain.run(request, HttpResponse::new(tx), ());

        match rx.await.map_err(|_| Error::Abandoned)? {
            Settled::Ended(response) => Ok(response),
            Settled::Passed { error: Some(e), .. } => Err(Error::Handler(e)),
            Settled::Passed { error: None, request, headers } => {
                let response = self.endpoint.call(request).await;
                Ok(prepend_headers(headers, response))
            }
        }
    }
}

/// Terminal callback of every [`Mount`] chain.
fn settle(outcome: Outcome<HttpRequest, HttpResponse, (), BoxError>) {
    let Outcome { error, request, mut response, .. } = outcome;
    response.pass(error, request);
}

impl<B> Service<http::Request<B>> for Mount
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let mount = self.clone();
        Box::pin(async move { Ok(mount.handle(req).await) })
    }
}

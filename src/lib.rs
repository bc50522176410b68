//! # waymark
//!
//! Prefix-scoped middleware dispatch. Nothing more. Nothing less.
//!
//! A [`Chain`] holds middleware in registration order, each scoped to a path
//! prefix. Running it walks the list once:
//!
//! - a middleware runs only if the request path starts with its prefix at a
//!   segment boundary, and sees the path with that prefix cut off;
//! - it hands control back through its [`Next`], now or later, from any task;
//! - the first reported error skips everything after it;
//! - a middleware that completes the response stops the chain for good;
//! - the terminal callback gets the request back with its original path.
//!
//! What waymark intentionally leaves to the host:
//!
//! - **Listening and connections**: hyper, behind your own accept loop
//! - **Routing by verb or parameters**: your endpoint decides
//! - **Timeouts and cancellation**: the server runtime
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use waymark::{BoxError, Chain, Completion, MountRequest, Outcome};
//!
//! #[derive(Default)]
//! struct Req { path: String, original: String }
//!
//! impl MountRequest for Req {
//!     fn path(&self) -> &str { &self.path }
//!     fn set_path(&mut self, path: String) { self.path = path }
//!     fn set_original_path(&mut self, path: String) { self.original = path }
//! }
//!
//! #[derive(Default)]
//! struct Res { ended: bool }
//!
//! impl Completion for Res {
//!     fn finished(&self) -> bool { self.ended }
//!     fn writable_ended(&self) -> bool { self.ended }
//! }
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let log = Arc::clone(&seen);
//!
//! let mut chain: Chain<Req, Res> = Chain::new(|outcome: Outcome<Req, Res, (), BoxError>| {
//!     assert!(outcome.error.is_none());
//!     assert_eq!(outcome.request.path, "/api/users?page=2");
//! });
//! chain.register("/api", move |next| {
//!     log.lock().unwrap().push(next.request().path.clone());
//!     next.proceed();
//! });
//!
//! chain.run(Req { path: "/api/users?page=2".into(), ..Req::default() }, Res::default(), ());
//! assert_eq!(*seen.lock().unwrap(), ["/users"]);
//! ```
//!
//! For hyper services, [`Mount`] puts a chain in front of an endpoint.

mod chain;
mod error;
mod handler;
mod next;
mod request;
mod response;
mod service;

pub mod path;

pub use chain::{Chain, Outcome};
pub use error::{BoxError, Error};
pub use handler::{Handler, Middleware};
pub use next::{Next, Step};
pub use path::Prefix;
pub use request::{HttpRequest, MountRequest};
pub use response::{Completion, HttpResponse, IntoResponse, Response, ResponseBuilder};
pub use service::{HttpNext, Mount};

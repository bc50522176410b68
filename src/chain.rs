//! The dispatch chain: ordered, prefix-scoped middleware with a terminal
//! callback.
//!
//! # How a run proceeds
//!
//! ```text
//! run(req, res, ctx)
//!   │  save original path, sanitize (cut at `?` / `#`)
//!   ▼
//! advance ──► response complete? ──yes──► restore path, stop silently
//!   │ no
//!   ├──► step failed? ──yes──► restore path, terminal(Some(err))
//!   ├──► end of chain? ──yes──► restore path, terminal(None)
//!   ▼
//! take registration[cursor], cursor += 1
//!   ├──► prefix mismatch ──► loop
//!   └──► prefix match ──► req.path = remainder; middleware(next)
//!                                  │
//!                     next.proceed() / next.fail(e) ──► advance
//! ```
//!
//! Every run owns its own state, moved into the [`Next`] handed to the
//! middleware, so concurrent runs over one chain share nothing but the
//! registration list.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::error::BoxError;
use crate::handler::{BoxedMiddleware, Middleware};
use crate::next::{Next, Step};
use crate::path::{self, Prefix};
use crate::request::MountRequest;
use crate::response::Completion;

/// Everything a run hands back when it finishes.
///
/// `request` carries its original path again, query string and fragment
/// included.
pub struct Outcome<Req, Res, Ctx, E> {
    /// The first error a middleware reported, if any.
    pub error: Option<E>,
    pub request: Req,
    pub response: Res,
    pub context: Ctx,
}

impl<Req, Res, Ctx, E> Outcome<Req, Res, Ctx, E> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

type Terminal<Req, Res, Ctx, E> = Arc<dyn Fn(Outcome<Req, Res, Ctx, E>) + Send + Sync>;

type Stack<Req, Res, Ctx, E> = Arc<Vec<Registration<Req, Res, Ctx, E>>>;

struct Registration<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    prefix: Prefix,
    middleware: BoxedMiddleware<Req, Res, Ctx, E>,
}

impl<Req, Res, Ctx, E> Clone for Registration<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    fn clone(&self) -> Self {
        Self { prefix: self.prefix.clone(), middleware: Arc::clone(&self.middleware) }
    }
}

/// An ordered list of prefix-scoped middleware.
///
/// Registration order is dispatch order. Nothing is sorted, merged or
/// deduplicated: the same middleware registered twice runs twice.
///
/// Cloning is cheap and clones share the registration list until one of them
/// registers something new. A run works on the list as it was when the run
/// started; later registrations only affect later runs.
pub struct Chain<Req, Res, Ctx = (), E = BoxError>
where
    Req: MountRequest,
    Res: Completion,
{
    stack: Stack<Req, Res, Ctx, E>,
    terminal: Terminal<Req, Res, Ctx, E>,
}

impl<Req, Res, Ctx, E> Chain<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    /// Creates an empty chain.
    ///
    /// `terminal` runs at most once per run: when every matching middleware
    /// passed, or as soon as one failed. It does not run when a middleware
    /// completed the response.
    pub fn new(terminal: impl Fn(Outcome<Req, Res, Ctx, E>) + Send + Sync + 'static) -> Self {
        Self { stack: Arc::new(Vec::new()), terminal: Arc::new(terminal) }
    }

    /// Appends a middleware scoped to `prefix`. Returns `self` for chaining.
    ///
    /// `"/"` and `""` scope it to every path; a trailing slash is ignored.
    pub fn register<F>(&mut self, prefix: impl Into<Prefix>, middleware: F) -> &mut Self
    where
        F: Fn(Next<Req, Res, Ctx, E>) + Send + Sync + 'static,
    {
        self.push(prefix.into(), Arc::new(middleware))
    }

    /// Appends a middleware that runs for every path.
    pub fn register_any<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(Next<Req, Res, Ctx, E>) + Send + Sync + 'static,
    {
        self.push(Prefix::any(), Arc::new(middleware))
    }

    /// Appends a [`Middleware`] implementation scoped to `prefix`.
    pub fn register_middleware(
        &mut self,
        prefix: impl Into<Prefix>,
        middleware: impl Middleware<Req, Res, Ctx, E> + 'static,
    ) -> &mut Self {
        self.push(prefix.into(), Arc::new(middleware))
    }

    /// By-value form of [`register`](Chain::register), for building a chain
    /// in one expression.
    pub fn at<F>(mut self, prefix: impl Into<Prefix>, middleware: F) -> Self
    where
        F: Fn(Next<Req, Res, Ctx, E>) + Send + Sync + 'static,
    {
        self.register(prefix, middleware);
        self
    }

    /// By-value form of [`register_any`](Chain::register_any).
    pub fn any<F>(mut self, middleware: F) -> Self
    where
        F: Fn(Next<Req, Res, Ctx, E>) + Send + Sync + 'static,
    {
        self.register_any(middleware);
        self
    }

    fn push(&mut self, prefix: Prefix, middleware: BoxedMiddleware<Req, Res, Ctx, E>) -> &mut Self {
        debug!(prefix = %prefix, position = self.stack.len(), "middleware registered");
        Arc::make_mut(&mut self.stack).push(Registration { prefix, middleware });
        self
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Registered prefixes, in dispatch order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Prefix> {
        self.stack.iter().map(|r| &r.prefix)
    }

    /// Runs the chain against one request/response pair.
    ///
    /// Returns as soon as the chain is finished or a middleware holds on to
    /// its continuation; in the latter case the run carries on whenever that
    /// continuation is resumed.
    pub fn run(&self, mut request: Req, response: Res, context: Ctx) {
        if self.stack.is_empty() {
            (self.terminal)(Outcome { error: None, request, response, context });
            return;
        }

        let original = request.path().to_owned();
        let path = path::sanitize(&original).to_owned();
        request.set_original_path(original.clone());
        request.set_path(path.clone());

        trace!(path = %original, middleware = self.stack.len(), "dispatch started");

        let state = RunState {
            request,
            response,
            context,
            cursor: 0,
            original,
            path,
            stack: Arc::clone(&self.stack),
            terminal: Arc::clone(&self.terminal),
            handoff: Arc::new(Handoff::default()),
        };
        advance(Box::new(state), Step::Continue);
    }
}

impl<Req, Res, Ctx, E> Clone for Chain<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    fn clone(&self) -> Self {
        Self { stack: Arc::clone(&self.stack), terminal: Arc::clone(&self.terminal) }
    }
}

impl<Req, Res, Ctx, E> fmt::Debug for Chain<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.prefixes().map(ToString::to_string)).finish()
    }
}

// ── Run state ─────────────────────────────────────────────────────────────────

/// Per-run state. Lives inside the [`Next`] of whichever middleware is
/// currently running.
pub(crate) struct RunState<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    pub(crate) request: Req,
    pub(crate) response: Res,
    pub(crate) context: Ctx,
    /// Index of the next registration to consider.
    pub(crate) cursor: usize,
    original: String,
    /// `original` cut at the first `?` or `#`.
    path: String,
    stack: Stack<Req, Res, Ctx, E>,
    terminal: Terminal<Req, Res, Ctx, E>,
    pub(crate) handoff: Arc<Handoff<Req, Res, Ctx, E>>,
}

impl<Req, Res, Ctx, E> RunState<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    pub(crate) fn original_path(&self) -> &str {
        &self.original
    }

    fn halt(mut self: Box<Self>) {
        debug!(path = %self.original, position = self.cursor, "response completed by middleware, chain stopped");
        let original = std::mem::take(&mut self.original);
        self.request.set_path(original);
    }

    fn finish(self: Box<Self>, error: Option<E>) {
        let RunState { mut request, response, context, original, terminal, .. } = *self;
        request.set_path(original);
        terminal(Outcome { error, request, response, context });
    }
}

type Parked<Req, Res, Ctx, E> = (Box<RunState<Req, Res, Ctx, E>>, Step<E>);

/// Where a continuation resumed during its own middleware call leaves the
/// run for the dispatch loop to pick up.
///
/// One per run. `driving` is set while `advance` is inside a middleware
/// call; a resume arriving then is parked instead of re-entering `advance`,
/// which keeps the stack flat however many middleware proceed synchronously.
pub(crate) struct Handoff<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    slot: Mutex<Slot<Req, Res, Ctx, E>>,
}

struct Slot<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    driving: bool,
    parked: Option<Parked<Req, Res, Ctx, E>>,
}

impl<Req, Res, Ctx, E> Default for Handoff<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    fn default() -> Self {
        Self { slot: Mutex::new(Slot { driving: false, parked: None }) }
    }
}

impl<Req, Res, Ctx, E> Handoff<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    fn enter(&self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).driving = true;
    }

    fn leave(&self) -> Option<Parked<Req, Res, Ctx, E>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.driving = false;
        slot.parked.take()
    }

    /// Keeps the run for the active loop, or gives it back when no loop is
    /// waiting on a middleware call.
    pub(crate) fn park(
        &self,
        state: Box<RunState<Req, Res, Ctx, E>>,
        step: Step<E>,
    ) -> Option<Parked<Req, Res, Ctx, E>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.driving {
            slot.parked = Some((state, step));
            None
        } else {
            Some((state, step))
        }
    }
}

/// Moves a run forward after a middleware reported `step`.
pub(crate) fn advance<Req, Res, Ctx, E>(mut state: Box<RunState<Req, Res, Ctx, E>>, mut step: Step<E>)
where
    Req: MountRequest,
    Res: Completion,
{
    let handoff = Arc::clone(&state.handoff);
    loop {
        if state.response.is_complete() {
            return state.halt();
        }

        if let Step::Fail(error) = step {
            debug!(path = %state.original, position = state.cursor, "middleware failed, chain short-circuited");
            return state.finish(Some(error));
        }

        let stack = Arc::clone(&state.stack);
        let Some(registration) = stack.get(state.cursor) else {
            trace!(path = %state.original, "chain exhausted");
            return state.finish(None);
        };
        state.cursor += 1;

        let Some(rest) = registration.prefix.strip(&state.path).map(|r| r.into_owned()) else {
            trace!(prefix = %registration.prefix, path = %state.path, "prefix did not match, skipped");
            step = Step::Continue;
            continue;
        };

        trace!(prefix = %registration.prefix, path = %rest, position = state.cursor - 1, "middleware entered");
        state.request.set_path(rest);
        handoff.enter();
        registration.middleware.handle(Next::new(state));

        // Resumed during the call: carry on here. Otherwise the middleware
        // kept its continuation and the run goes on when it resumes.
        let Some((parked, resumed)) = handoff.leave() else {
            return;
        };
        state = parked;
        step = resumed;
    }
}

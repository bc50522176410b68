//! The continuation handed to every middleware.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::warn;

use crate::chain::{RunState, advance};
use crate::request::MountRequest;
use crate::response::Completion;

/// What a middleware reports when it hands control back to the chain.
#[derive(Debug)]
pub enum Step<E> {
    /// Run the next matching middleware.
    Continue,
    /// Skip the rest of the chain and hand `E` to the terminal callback.
    Fail(E),
}

impl<E> Step<E> {
    pub fn is_continue(&self) -> bool {
        matches!(self, Step::Continue)
    }
}

impl<E> From<Result<(), E>> for Step<E> {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Step::Continue,
            Err(e) => Step::Fail(e),
        }
    }
}

/// Continuation of one run.
///
/// `Next` owns everything the run needs: the request, the response, the
/// context and the position in the chain. A middleware reads and mutates the
/// request and response through it, then consumes it with [`proceed`],
/// [`fail`] or [`resume`]. Because those take `self`, a continuation can be
/// resumed at most once, and it can be moved into a spawned task to resume
/// later.
///
/// Resuming from inside the middleware call does not grow the stack: the
/// step is handed back to the dispatch loop that called the middleware.
///
/// A middleware that ends the response itself may simply drop its `Next`.
/// Dropping it while the response is still incomplete leaves the run
/// unfinished and is logged as a warning.
///
/// [`proceed`]: Next::proceed
/// [`fail`]: Next::fail
/// [`resume`]: Next::resume
pub struct Next<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    // Moved out only by `into_state`, which never runs `Drop`.
    state: ManuallyDrop<Box<RunState<Req, Res, Ctx, E>>>,
}

impl<Req, Res, Ctx, E> Next<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    pub(crate) fn new(state: Box<RunState<Req, Res, Ctx, E>>) -> Self {
        Self { state: ManuallyDrop::new(state) }
    }

    fn into_state(self) -> Box<RunState<Req, Res, Ctx, E>> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the state is moved out once and
        // never dropped in place.
        unsafe { ManuallyDrop::take(&mut this.state) }
    }

    /// The request, with its path rewritten relative to the matched prefix.
    pub fn request(&self) -> &Req {
        &self.state.request
    }

    pub fn request_mut(&mut self) -> &mut Req {
        &mut self.state.request
    }

    pub fn response(&self) -> &Res {
        &self.state.response
    }

    pub fn response_mut(&mut self) -> &mut Res {
        &mut self.state.response
    }

    pub fn context(&self) -> &Ctx {
        &self.state.context
    }

    pub fn context_mut(&mut self) -> &mut Ctx {
        &mut self.state.context
    }

    /// Mutable access to request, response and context at once.
    pub fn parts_mut(&mut self) -> (&mut Req, &mut Res, &mut Ctx) {
        let state = &mut **self.state;
        (&mut state.request, &mut state.response, &mut state.context)
    }

    /// The request path as it was when the run started, query and fragment
    /// included.
    pub fn original_path(&self) -> &str {
        self.state.original_path()
    }

    /// Hands control to the next matching middleware.
    pub fn proceed(self) {
        self.resume(Step::Continue)
    }

    /// Stops the chain and forwards `error` to the terminal callback.
    pub fn fail(self, error: impl Into<E>) {
        self.resume(Step::Fail(error.into()))
    }

    pub fn resume(self, step: Step<E>) {
        let state = self.into_state();
        let handoff = Arc::clone(&state.handoff);
        if let Some((state, step)) = handoff.park(state, step) {
            advance(state, step);
        }
    }
}

impl<Req, Res, Ctx, E> Drop for Next<Req, Res, Ctx, E>
where
    Req: MountRequest,
    Res: Completion,
{
    fn drop(&mut self) {
        if !self.state.response.is_complete() {
            warn!(
                path = self.state.original_path(),
                position = self.state.cursor,
                "continuation dropped before the response was completed"
            );
        }
        // SAFETY: `drop` runs at most once and `into_state` skips it.
        unsafe { ManuallyDrop::drop(&mut self.state) }
    }
}

//! Unified error type.

use std::fmt;

/// Boxed error reported by a middleware through [`Next::fail`](crate::Next::fail).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a request did not get a regular response from the [`Mount`](crate::Mount)
/// service.
///
/// The dispatch engine itself has no error kind of its own: whatever a
/// middleware reports is forwarded verbatim. This type exists for the HTTP
/// adapter, which has to turn every way a run can end into a response.
#[derive(Debug)]
pub enum Error {
    /// A middleware reported a failure.
    Handler(BoxError),
    /// The request body could not be read.
    Body(BoxError),
    /// A middleware dropped its continuation without ending the response.
    Abandoned,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(e) => write!(f, "middleware: {e}"),
            Self::Body(e) => write!(f, "request body: {e}"),
            Self::Abandoned => f.write_str("middleware dropped the request without responding"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handler(e) | Self::Body(e) => Some(e.as_ref()),
            Self::Abandoned => None,
        }
    }
}

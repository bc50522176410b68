//! Response completion, the response middleware write into, and the
//! [`IntoResponse`] conversion trait.

use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use http_body_util::Full;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::BoxError;
use crate::request::HttpRequest;

// ── Completion ────────────────────────────────────────────────────────────────

/// A response the chain can observe for completion.
///
/// The two signals are set independently and may flip at different moments:
/// `writable_ended` once the response body has been handed off, `finished`
/// once delivery succeeded. Either one stops the chain.
pub trait Completion {
    fn finished(&self) -> bool;

    fn writable_ended(&self) -> bool;

    fn is_complete(&self) -> bool {
        self.finished() || self.writable_ended()
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A finished HTTP response.
///
/// ```rust
/// use waymark::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` type hyper serves.
    ///
    /// A header that is not a valid HTTP header turns the whole response into
    /// a bare `500`.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|e| {
            error!(error = %e, "invalid response header");
            let mut res = http::Response::new(Full::new(Bytes::new()));
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res
        })
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish("application/json", body.into())
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", Bytes::from(body.into()))
    }

    pub fn bytes(self, content_type: &str, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        let mut headers = vec![(CONTENT_TYPE.as_str().to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { status: self.status, headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from endpoints.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

// ── HttpResponse ──────────────────────────────────────────────────────────────

/// How a run of the [`Mount`](crate::Mount) chain settled.
pub(crate) enum Settled {
    /// A middleware ended the response itself.
    Ended(Response),
    /// The chain finished; the request goes on to the endpoint, or fails.
    /// `headers` were set by middleware along the way.
    Passed { error: Option<BoxError>, request: HttpRequest, headers: Vec<(String, String)> },
}

/// The response middleware write into.
///
/// Status and headers accumulate until [`end`](HttpResponse::end) hands the
/// response off. After that the response is complete and the chain stops
/// without calling any further middleware.
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    writable_ended: bool,
    finished: bool,
    sink: Option<oneshot::Sender<Settled>>,
}

impl HttpResponse {
    pub(crate) fn new(sink: oneshot::Sender<Settled>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            writable_ended: false,
            finished: false,
            sink: Some(sink),
        }
    }

    pub fn status(&self) -> StatusCode { self.status }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Adds a header to the response under construction. Headers set here
    /// are kept when the endpoint answers, too.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Ends the response with `body`, using the status and headers set so far.
    pub fn end(&mut self, body: impl Into<Bytes>) {
        let response = Response {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body: body.into(),
        };
        self.deliver(response);
    }

    /// Ends the response with a prebuilt one. Headers set earlier on this
    /// response come first.
    pub fn send(&mut self, response: impl IntoResponse) {
        let response = prepend_headers(std::mem::take(&mut self.headers), response.into_response());
        self.deliver(response);
    }

    fn deliver(&mut self, response: Response) {
        if self.writable_ended {
            warn!(status = %response.status, "response already ended, ignoring second end");
            return;
        }
        self.writable_ended = true;

        match self.sink.take() {
            Some(sink) => match sink.send(Settled::Ended(response)) {
                Ok(()) => self.finished = true,
                Err(_) => debug!("client went away before the response was delivered"),
            },
            None => debug!("response has no receiver"),
        }
    }

    /// Hands the request on once the chain finished.
    pub(crate) fn pass(&mut self, error: Option<BoxError>, request: HttpRequest) {
        let headers = std::mem::take(&mut self.headers);
        match self.sink.take() {
            Some(sink) => {
                if sink.send(Settled::Passed { error, request, headers }).is_err() {
                    debug!("client went away before the chain finished");
                }
            }
            None => debug!("chain finished after the response was handed off"),
        }
    }
}

/// Puts `headers` in front of the ones `response` already carries.
pub(crate) fn prepend_headers(mut headers: Vec<(String, String)>, mut response: Response) -> Response {
    headers.append(&mut response.headers);
    response.headers = headers;
    response
}

impl Completion for HttpResponse {
    fn finished(&self) -> bool {
        self.finished
    }

    fn writable_ended(&self) -> bool {
        self.writable_ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_puts_content_type_first() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .json(r#"{"id":42}"#);

        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers[0].0, "content-type");
        assert_eq!(res.header("Location"), Some("/users/42"));
        assert_eq!(res.body(), br#"{"id":42}"#);
    }

    #[test]
    fn test_builder_bytes_sets_content_type() {
        let res = Response::builder().bytes("image/svg+xml", Bytes::from_static(b"<svg/>"));

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("image/svg+xml"));
        assert_eq!(res.body(), b"<svg/>");
    }

    #[test]
    fn test_into_inner() {
        let res = Response::text("hi").into_inner();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_invalid_header_becomes_500() {
        let res = Response::builder().header("bad header", "x").no_body().into_inner();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_end_delivers_and_completes() {
        let (tx, mut rx) = oneshot::channel();
        let mut res = HttpResponse::new(tx);
        assert!(!res.is_complete());

        res.set_status(StatusCode::ACCEPTED);
        res.set_header("x-served-by", "middleware");
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.header("X-Served-By"), Some("middleware"));
        res.end("done");
        assert_eq!(res.header("x-served-by"), None);

        assert!(res.writable_ended());
        assert!(res.finished());
        match rx.try_recv() {
            Ok(Settled::Ended(sent)) => {
                assert_eq!(sent.status_code(), StatusCode::ACCEPTED);
                assert_eq!(sent.header("x-served-by"), Some("middleware"));
                assert_eq!(sent.body(), b"done");
            }
            _ => panic!("expected an ended response"),
        }
    }

    #[test]
    fn test_end_without_receiver_is_still_complete() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let mut res = HttpResponse::new(tx);

        res.end("nobody listening");

        assert!(res.writable_ended());
        assert!(!res.finished());
        assert!(res.is_complete());
    }

    #[test]
    fn test_send_keeps_earlier_headers() {
        let (tx, mut rx) = oneshot::channel();
        let mut res = HttpResponse::new(tx);
        res.set_header("access-control-allow-origin", "*");

        res.send(StatusCode::NO_CONTENT);

        match rx.try_recv() {
            Ok(Settled::Ended(sent)) => {
                assert_eq!(sent.status_code(), StatusCode::NO_CONTENT);
                assert_eq!(sent.header("access-control-allow-origin"), Some("*"));
            }
            _ => panic!("expected an ended response"),
        }
    }
}

//! What the chain needs from a request, and the HTTP request the [`Mount`]
//! service hands to middleware.
//!
//! [`Mount`]: crate::Mount

use bytes::Bytes;
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use hyper::body::Body;

use crate::error::{BoxError, Error};

/// A request the chain can scope by path.
///
/// The chain reads the path once when a run starts, stores it through
/// [`set_original_path`](MountRequest::set_original_path), then rewrites the
/// live path for each matching middleware and puts the original back before
/// the terminal callback.
pub trait MountRequest {
    /// The live path, as seen by the current middleware. Before a run starts
    /// this is the full request target, query string included.
    fn path(&self) -> &str;

    fn set_path(&mut self, path: String);

    fn set_original_path(&mut self, path: String);
}

/// An incoming HTTP request with its body already read.
pub struct HttpRequest {
    method: Method,
    path: String,
    original_path: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, target: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self { method, path: target.into(), original_path: None, headers, body }
    }

    /// Reads the whole body of `req`.
    pub(crate) async fn from_http<B>(req: http::Request<B>) -> Result<Self, Error>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = body.collect().await.map_err(|e| Error::Body(e.into()))?.to_bytes();
        let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        Ok(Self::new(parts.method, target, parts.headers, body))
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The path relative to the prefix of the middleware currently running.
    pub fn path(&self) -> &str { &self.path }

    /// The request target as received, query string included.
    pub fn original_path(&self) -> &str {
        self.original_path.as_deref().unwrap_or(&self.path)
    }

    /// The raw query string of the original target, without the `?`.
    /// `None` when the target has no query, or when `?` only appears in the
    /// fragment.
    pub fn query(&self) -> Option<&str> {
        let target = self.original_path();
        let rest = target[target.find(['?', '#'])?..].strip_prefix('?')?;
        Some(rest.split_once('#').map_or(rest, |(query, _)| query))
    }

    /// Header lookup. Values that are not valid visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
}

impl MountRequest for HttpRequest {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn set_original_path(&mut self, path: String) {
        self.original_path = Some(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str) -> HttpRequest {
        HttpRequest::new(Method::GET, target, HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn test_original_path_defaults_to_path() {
        let req = request("/users?page=2");
        assert_eq!(req.original_path(), "/users?page=2");
    }

    #[test]
    fn test_query() {
        assert_eq!(request("/users?page=2").query(), Some("page=2"));
        assert_eq!(request("/users?page=2#top").query(), Some("page=2"));
        assert_eq!(request("/users").query(), None);
        assert_eq!(request("/test#foo?bin=baz").query(), None);
        assert_eq!(request("/test?#frag").query(), Some(""));

        let mut req = request("/");
        req.set_original_path("/api/users?sort=asc".to_owned());
        assert_eq!(req.query(), Some("sort=asc"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        let req = HttpRequest::new(Method::GET, "/", headers, Bytes::new());
        assert_eq!(req.header("X-Api-Key"), Some("secret"));
        assert_eq!(req.header("authorization"), None);
    }

    #[test]
    fn test_headers_mut() {
        let mut req = request("/");
        req.headers_mut().insert("x-request-id", "42".parse().unwrap());
        assert_eq!(req.header("x-request-id"), Some("42"));
        assert_eq!(req.headers().len(), 1);
    }

    #[tokio::test]
    async fn test_from_http_reads_body_and_target() {
        let req = http::Request::builder()
            .method(Method::POST)
            .uri("http://localhost/items?draft=1")
            .body(http_body_util::Full::new(Bytes::from_static(b"payload")))
            .unwrap();

        let req = HttpRequest::from_http(req).await.unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.path(), "/items?draft=1");
        assert_eq!(req.body(), b"payload");
    }
}

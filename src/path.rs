//! Prefix normalization and segment-aware prefix matching.
//!
//! A [`Prefix`] is compiled once, at registration time. Matching is a plain
//! string comparison against the sanitized request path; no regex, no tree.
//! Each registration is tested on its own; the chain's registration order is
//! the only tie-break between overlapping prefixes.
//!
//! | Registered   | Normalized | `/api`  | `/api/users` | `/apix`   |
//! |--------------|------------|---------|--------------|----------|
//! | *(none)*     | `""`       | `/api`  | `/api/users` | `/apix`   |
//! | `"/"`        | `""`       | `/api`  | `/api/users` | `/apix`   |
//! | `"/api"`     | `"/api"`   | `/`     | `/users`     | no match |
//! | `"/api/"`    | `"/api"`   | `/`     | `/users`     | no match |

use std::borrow::Cow;
use std::fmt;

/// A normalized mount prefix.
///
/// The empty prefix matches every path and never rewrites it. A non-empty
/// prefix never ends with `/`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Prefix(String);

impl Prefix {
    /// Normalizes a registered prefix.
    ///
    /// `None`, `""` and `"/"` all become the match-all prefix. Anything else
    /// loses its trailing slash.
    pub fn new(raw: Option<&str>) -> Self {
        match raw.map(|p| p.trim_end_matches('/')) {
            None | Some("") => Self::default(),
            Some(p) => Self(p.to_owned()),
        }
    }

    /// The match-all prefix.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    /// Tests `path` against this prefix and returns the remainder.
    ///
    /// `path` must already be sanitized (see [`sanitize`]). The prefix only
    /// matches at a segment boundary: `/api` matches `/api` and `/api/x` but
    /// not `/apix`. The remainder always starts with `/`; an exact match
    /// yields `"/"`.
    pub fn strip<'a>(&self, path: &'a str) -> Option<Cow<'a, str>> {
        if self.is_any() {
            return Some(Cow::Borrowed(path));
        }

        let rest = path.strip_prefix(self.0.as_str())?;
        if rest.is_empty() {
            Some(Cow::Borrowed("/"))
        } else if rest.starts_with('/') {
            Some(Cow::Borrowed(rest))
        } else {
            None
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }
}

impl From<&str> for Prefix {
    fn from(raw: &str) -> Self {
        Self::new(Some(raw))
    }
}

impl From<Option<&str>> for Prefix {
    fn from(raw: Option<&str>) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() { f.write_str("*") } else { f.write_str(&self.0) }
    }
}

/// Cuts `path` at the first `?` or `#`.
///
/// Only the part before the query string or fragment takes part in matching.
pub fn sanitize(path: &str) -> &str {
    path.find(['?', '#']).map_or(path, |i| &path[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_all_normalization() {
        for raw in [None, Some(""), Some("/")] {
            let prefix = Prefix::new(raw);
            assert!(prefix.is_any(), "{raw:?} should normalize to match-all");
            assert_eq!(prefix.strip("/inner/in/depth").as_deref(), Some("/inner/in/depth"));
        }
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        assert_eq!(Prefix::from("/inner/").as_str(), "/inner");
        assert_eq!(Prefix::from("/inner").as_str(), "/inner");
        assert_eq!(Prefix::from("/inner//").as_str(), "/inner");
        assert!(Prefix::from("//").is_any());
    }

    #[test]
    fn test_strip_remainder() {
        let prefix = Prefix::from("/a");
        assert_eq!(prefix.strip("/a/b").as_deref(), Some("/b"));
        assert_eq!(prefix.strip("/a/b/c").as_deref(), Some("/b/c"));
        assert_eq!(prefix.strip("/a/").as_deref(), Some("/"));
    }

    #[test]
    fn test_exact_match_strips_to_root() {
        assert_eq!(Prefix::from("/a").strip("/a").as_deref(), Some("/"));
        assert_eq!(Prefix::from("/path/").strip("/path").as_deref(), Some("/"));
    }

    #[test]
    fn test_segment_boundary() {
        let prefix = Prefix::from("/tasks");
        assert!(!prefix.matches("/tasks-api/task"));
        assert!(!prefix.matches("/tasksx"));
        assert!(!prefix.matches("/"));
        assert!(prefix.matches("/tasks/1"));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert!(!Prefix::from("/Admin").matches("/admin"));
    }

    #[test]
    fn test_longer_prefix_does_not_match_shorter_path() {
        assert!(!Prefix::from("/path/inner").matches("/path"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("/test#foo?bin=baz"), "/test");
        assert_eq!(sanitize("/test?bin=baz#foo"), "/test");
        assert_eq!(sanitize("/test"), "/test");
        assert_eq!(sanitize("?q=1"), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(Prefix::any().to_string(), "*");
        assert_eq!(Prefix::from("/api/").to_string(), "/api");
    }
}

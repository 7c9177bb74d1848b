use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::io;

use crate::registry::InstantiationError;

/// Inline capacity for response header lists; most responses set fewer.
pub const MAX_INLINE_HEADERS: usize = 8;

/// Stack-allocated response header list. Kept as a list rather than a map
/// so handlers can emit repeated names; emission merges and deduplicates.
pub type HeaderVec = SmallVec<[(String, String); MAX_INLINE_HEADERS]>;

/// Normalized request handed to handler backends.
///
/// Built by the dispatcher from the transport-supplied [`InboundRequest`]
/// according to the route's policy: `headers` is only populated when header
/// capture is on, `cookies` when cookie parsing is on, and `session` when a
/// session was resolved.
#[derive(Debug, Clone, Default)]
pub struct HandlerRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Raw query string, when present.
    pub query: Option<String>,
    /// Client address as reported by the transport.
    pub client_addr: String,
    /// `User-Agent` header value, when present.
    pub user_agent: Option<String>,
    /// Request headers (lowercase names); empty unless header capture is on.
    pub headers: HashMap<String, String>,
    /// Query-string and form-body parameters, merged; body wins on
    /// duplicate names.
    pub form: HashMap<String, String>,
    /// Parsed cookies; empty unless cookie parsing is on.
    pub cookies: HashMap<String, String>,
    /// Session fields loaded from the store; empty without a session.
    pub session: HashMap<String, String>,
}

impl HandlerRequest {
    /// Get a form parameter by name.
    #[inline]
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// Get a cookie by name.
    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Response a handler populates: status, headers, body, and any session
/// fields to persist after the request.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers; repeated names allowed, merged at emission.
    pub headers: HeaderVec,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Session fields to bulk-write after the response, when a session is
    /// active.
    pub session: HashMap<String, String>,
}

impl Default for HandlerResponse {
    /// The empty default response: status 200, `text/plain`, no body. A
    /// handler that produces no output yields exactly this.
    fn default() -> Self {
        let mut headers = HeaderVec::new();
        headers.push(("Content-Type".to_string(), "text/plain".to_string()));
        Self {
            status: 200,
            headers,
            body: Vec::new(),
            session: HashMap::new(),
        }
    }
}

impl HandlerResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header by name (case-insensitive).
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any header of the same name (case-insensitive) with `value`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Append a header without touching existing ones of the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Effective `Content-Type`, falling back to the default.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.get_header("content-type").unwrap_or("text/plain")
    }

    /// Set a UTF-8 text body.
    pub fn set_text(&mut self, body: impl Into<String>) {
        self.body = body.into().into_bytes();
    }
}

/// How the request body reaches the dispatcher.
///
/// Acquiring the body is the lifecycle's single suspension point: a
/// [`Pending`](Self::Pending) source wraps the host's continuation and is
/// invoked exactly once, after which the rest of the lifecycle runs without
/// further suspension. Transports that buffer eagerly hand over
/// [`Ready`](Self::Ready) and both shapes flow through the same dispatch
/// entry point.
pub enum BodySource {
    /// No body was sent.
    None,
    /// The body is already buffered.
    Ready(Vec<u8>),
    /// The body becomes available when the continuation is invoked.
    Pending(Box<dyn FnOnce() -> io::Result<Vec<u8>> + Send>),
}

impl BodySource {
    /// Resolve the source into body bytes, invoking a pending continuation.
    pub fn acquire(self) -> io::Result<Option<Vec<u8>>> {
        match self {
            BodySource::None => Ok(None),
            BodySource::Ready(bytes) => Ok(Some(bytes)),
            BodySource::Pending(resume) => resume().map(Some),
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        BodySource::None
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::None => f.write_str("BodySource::None"),
            BodySource::Ready(bytes) => write!(f, "BodySource::Ready({} bytes)", bytes.len()),
            BodySource::Pending(_) => f.write_str("BodySource::Pending"),
        }
    }
}

/// One inbound request as the transport hands it over, before any
/// route-policy normalization.
#[derive(Debug, Default)]
pub struct InboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Raw query string, when present.
    pub query: Option<String>,
    /// Client address as reported by the transport.
    pub client_addr: String,
    /// All request headers, lowercase names.
    pub headers: HashMap<String, String>,
    /// Prior-response timestamp from `If-Modified-Since`, unix seconds.
    pub if_modified_since: Option<u64>,
    /// The request body, immediate or deferred.
    pub body: BodySource,
}

impl InboundRequest {
    /// Bare request for the given method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Header lookup by lowercase name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Declared body length from `Content-Length`, zero when absent.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Declared `Content-Type`, when present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Terminal result of a dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Unsupported request shape; control returns to the host's default
    /// handling. Deliberate narrowing, not an error.
    Declined,
    /// Freshness short-circuit: the caller's prior response is still
    /// valid. No cache or session side effects were performed.
    NotModified,
    /// The lifecycle ran to completion.
    Completed(HandlerResponse),
}

/// A request-fatal dispatch failure, surfaced to the host as an internal
/// error with no partial response emitted.
#[derive(Debug)]
pub enum DispatchError {
    /// The body continuation failed to deliver the buffered body.
    BodyRead(io::Error),
    /// The route's handler module failed to produce an instance.
    Instantiation(InstantiationError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::BodyRead(err) => write!(f, "request body read failed: {}", err),
            DispatchError::Instantiation(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::BodyRead(err) => Some(err),
            DispatchError::Instantiation(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_response_is_empty_text() {
        let res = HandlerResponse::new();
        assert_eq!(res.status, 200);
        assert_eq!(res.content_type(), "text/plain");
        assert!(res.body.is_empty());
        assert!(res.session.is_empty());
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut res = HandlerResponse::new();
        res.set_header("content-type", "application/json");
        assert_eq!(res.headers.len(), 1);
        assert_eq!(res.content_type(), "application/json");
    }

    #[test]
    fn test_add_header_keeps_repeats_until_emission() {
        let mut res = HandlerResponse::new();
        res.add_header("Set-Cookie", "a=1");
        res.add_header("Set-Cookie", "b=2");
        assert_eq!(
            res.headers
                .iter()
                .filter(|(k, _)| k == "Set-Cookie")
                .count(),
            2
        );
        // lookup returns the first match
        assert_eq!(res.get_header("set-cookie"), Some("a=1"));
    }

    #[test]
    fn test_body_source_acquire() {
        assert!(BodySource::None.acquire().unwrap().is_none());
        assert_eq!(
            BodySource::Ready(b"a=1".to_vec()).acquire().unwrap(),
            Some(b"a=1".to_vec())
        );
        let pending = BodySource::Pending(Box::new(|| Ok(b"b=2".to_vec())));
        assert_eq!(pending.acquire().unwrap(), Some(b"b=2".to_vec()));
    }

    #[test]
    fn test_content_length_parses_declared_size() {
        let mut req = InboundRequest::new(Method::POST, "/submit");
        assert_eq!(req.content_length(), 0);
        req.headers
            .insert("content-length".to_string(), "42".to_string());
        assert_eq!(req.content_length(), 42);
        req.headers
            .insert("content-length".to_string(), "junk".to_string());
        assert_eq!(req.content_length(), 0);
    }
}

//! Dispatcher core - the per-request lifecycle.
//!
//! One dispatch drives a route binding through the full pipeline:
//!
//! ```text
//! Received -> (acquire body) -> FreshnessChecked -> CacheChecked
//!   hit  ............................................> Responding
//!   miss -> Normalized -> SessionResolved -> HandlerInvoked
//!            -> CachePopulated -> SessionPersisted ...> Responding
//! ```
//!
//! Acquiring the body is the single suspension point ([`BodySource`]); a
//! request with no body and a request with a deferred body flow through the
//! same entry point. Everything after runs to completion on the calling
//! worker, which the host transport supplies; this core owns no threads.
//!
//! Failure policy: a body-read or handler-instantiation failure is fatal
//! for the request and surfaces as [`DispatchError`]; script engine
//! failures and session store failures are absorbed (empty response,
//! stateless continuation) with a warning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, warn};
use url::form_urlencoded;

use super::types::{
    DispatchError, DispatchOutcome, HandlerRequest, HandlerResponse, InboundRequest,
};
use crate::cache::{digest_key, unix_now, CacheEntry};
use crate::context::{HandlerBinding, RouteBinding, ServerContext};
use crate::scripting::ScriptSource;
use crate::session::{SessionError, SessionStore, SESSION_COOKIE};

/// The single supported body content type.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Case-insensitive prefix match, so parameterized values like
/// `application/x-www-form-urlencoded; charset=UTF-8` are accepted.
fn is_form_content_type(value: &str) -> bool {
    value.len() >= FORM_URLENCODED.len()
        && value.as_bytes()[..FORM_URLENCODED.len()]
            .eq_ignore_ascii_case(FORM_URLENCODED.as_bytes())
}

/// Decode a form-encoded string into `into`, later names overwriting
/// earlier ones.
fn parse_form_params(input: &str, into: &mut HashMap<String, String>) {
    for (name, value) in form_urlencoded::parse(input.as_bytes()) {
        into.insert(name.into_owned(), value.into_owned());
    }
}

/// Split a cookie header value on `;` into name/value pairs.
fn parse_cookie_header(value: &str, into: &mut HashMap<String, String>) {
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let name = match parts.next() {
            Some(n) if !n.is_empty() => n.trim(),
            _ => continue,
        };
        let val = parts.next().unwrap_or("").trim();
        into.insert(name.to_string(), val.to_string());
    }
}

fn http_date(unix_secs: u64) -> String {
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(unix_secs))
}

/// Drives requests through the lifecycle against process-scoped state.
///
/// Cheap to clone conceptually (it holds only a context handle); one
/// instance can serve any number of concurrent workers.
pub struct Dispatcher {
    ctx: Arc<ServerContext>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// The context this dispatcher serves from.
    #[must_use]
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Run one request through the lifecycle against `binding`.
    pub fn dispatch(
        &self,
        binding: &RouteBinding,
        mut inbound: InboundRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        // A declared body in anything but the supported form encoding is
        // handed back to the host, untouched.
        if inbound.content_length() > 0 {
            let supported = inbound.content_type().is_some_and(is_form_content_type);
            if !supported {
                debug!(path = %inbound.path, content_type = ?inbound.content_type(), "declining unsupported body");
                return Ok(DispatchOutcome::Declined);
            }
        }

        // The one suspension point: resolve the body, invoking the host's
        // continuation when it was deferred.
        let body = std::mem::take(&mut inbound.body)
            .acquire()
            .map_err(DispatchError::BodyRead)?;

        let now = unix_now();
        if let Some(prior) = inbound.if_modified_since {
            if now.saturating_sub(prior) <= binding.cache_ttl {
                debug!(path = %inbound.path, "prior response still fresh");
                return Ok(DispatchOutcome::NotModified);
            }
        }

        let mut response = HandlerResponse::new();
        let cache_key = binding
            .cache
            .as_ref()
            .map(|_| digest_key(&inbound.path, inbound.query.as_deref()));

        if let (Some(cache), Some(key)) = (binding.cache.as_ref(), cache_key.as_deref()) {
            if let Some(entry) = cache.get(key) {
                if entry.age(now) > binding.cache_ttl {
                    cache.erase(key);
                    debug!(key, "stale cache entry erased");
                } else {
                    debug!(key, age = entry.age(now), "cache hit");
                    response.status = entry.status;
                    response.set_header("Content-Type", entry.content_type);
                    response.set_header("Last-Modified", http_date(entry.created_at));
                    response.body = entry.body;
                    return Ok(DispatchOutcome::Completed(response));
                }
            }
        }

        let mut request = normalize(binding, &inbound, body.as_deref());
        let session_token = self.resolve_session(binding, &mut request);

        self.invoke(binding, &request, &mut response)?;

        if let (Some(cache), Some(key)) = (binding.cache.as_ref(), cache_key) {
            response.set_header("Last-Modified", http_date(now));
            if binding.cache_ttl > 0 {
                cache.put(
                    key,
                    CacheEntry {
                        status: response.status,
                        content_type: response.content_type().to_string(),
                        body: response.body.clone(),
                        created_at: now,
                    },
                );
            }
        }

        if let Some(token) = session_token {
            if !response.session.is_empty() {
                if let Err(e) = self.ctx.sessions().write_fields(&token, &response.session) {
                    warn!(error = %e, "session fields not persisted");
                }
            }
        }

        Ok(DispatchOutcome::Completed(response))
    }

    /// Resolve session state for the request, returning the active token.
    ///
    /// Store failures degrade to stateless operation; an unconfigured store
    /// is skipped without noise.
    fn resolve_session(
        &self,
        binding: &RouteBinding,
        request: &mut HandlerRequest,
    ) -> Option<String> {
        if !binding.session_enabled {
            return None;
        }
        let token = request.cookies.get(SESSION_COOKIE)?.clone();
        let store = self.ctx.sessions();
        match load_session(store, &token, binding.session_ttl, request) {
            Ok(()) => Some(token),
            Err(SessionError::Disabled) => {
                debug!("session store not configured, continuing stateless");
                None
            }
            Err(e) => {
                warn!(error = %e, "session store unavailable, continuing stateless");
                None
            }
        }
    }

    /// Dispatch to exactly one backend: registry instantiation + invocation
    /// for native modules, or a script engine in tree or inline mode.
    fn invoke(
        &self,
        binding: &RouteBinding,
        request: &HandlerRequest,
        response: &mut HandlerResponse,
    ) -> Result<(), DispatchError> {
        match &binding.handler {
            HandlerBinding::Native { module } => {
                let mut handler = self
                    .ctx
                    .registry()
                    .instantiate(*module)
                    .map_err(DispatchError::Instantiation)?;
                handler.handle(request, response);
            }
            HandlerBinding::Script { engine, source } => {
                let result = match source {
                    ScriptSource::Tree(root) => {
                        let script = root.join(request.path.trim_start_matches('/'));
                        engine.run_file(&script, request, response)
                    }
                    ScriptSource::Inline(body) => engine.run_inline(body, request, response),
                };
                if let Err(e) = result {
                    warn!(engine = engine.name(), error = %e, "script failed, replying empty");
                    *response = HandlerResponse::new();
                }
            }
        }
        Ok(())
    }
}

/// Build the normalized handler request according to the route's policy.
fn normalize(
    binding: &RouteBinding,
    inbound: &InboundRequest,
    body: Option<&[u8]>,
) -> HandlerRequest {
    let mut request = HandlerRequest {
        method: inbound.method.clone(),
        path: inbound.path.clone(),
        query: inbound.query.clone(),
        client_addr: inbound.client_addr.clone(),
        user_agent: inbound.header("user-agent").map(str::to_string),
        ..HandlerRequest::default()
    };
    if binding.capture_headers {
        request.headers = inbound.headers.clone();
    }
    if let Some(query) = inbound.query.as_deref() {
        parse_form_params(query, &mut request.form);
    }
    if let Some(body) = body {
        parse_form_params(&String::from_utf8_lossy(body), &mut request.form);
    }
    if binding.cookies_enabled {
        if let Some(cookie) = inbound.header("cookie") {
            parse_cookie_header(cookie, &mut request.cookies);
        }
    }
    request
}

/// Load or create the record under `token`: an unknown token is created
/// with the configured TTL and seeded with itself; a known token has all
/// its fields loaded.
fn load_session(
    store: &dyn SessionStore,
    token: &str,
    ttl_secs: u64,
    request: &mut HandlerRequest,
) -> Result<(), SessionError> {
    if store.exists(token)? {
        request.session = store.read_all(token)?;
    } else {
        store.create(token, Duration::from_secs(ttl_secs))?;
        request
            .session
            .insert(SESSION_COOKIE.to_string(), token.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_form_content_type() {
        assert!(is_form_content_type("application/x-www-form-urlencoded"));
        assert!(is_form_content_type(
            "Application/X-WWW-Form-Urlencoded; charset=UTF-8"
        ));
        assert!(!is_form_content_type("application/json"));
        assert!(!is_form_content_type("text"));
    }

    #[test]
    fn test_parse_form_params_merges_and_decodes() {
        let mut params = HashMap::new();
        parse_form_params("a=1&b=hello%20world", &mut params);
        assert_eq!(params.get("a"), Some(&"1".to_string()));
        assert_eq!(params.get("b"), Some(&"hello world".to_string()));
        // later input overwrites
        parse_form_params("a=2", &mut params);
        assert_eq!(params.get("a"), Some(&"2".to_string()));
    }

    #[test]
    fn test_parse_cookie_header() {
        let mut cookies = HashMap::new();
        parse_cookie_header("SESSIONID=abc123; theme=dark;  empty=", &mut cookies);
        assert_eq!(cookies.get("SESSIONID"), Some(&"abc123".to_string()));
        assert_eq!(cookies.get("theme"), Some(&"dark".to_string()));
        assert_eq!(cookies.get("empty"), Some(&"".to_string()));
    }

    #[test]
    fn test_http_date_round_trip() {
        let formatted = http_date(0);
        assert_eq!(formatted, "Thu, 01 Jan 1970 00:00:00 GMT");
    }
}
